//! Suporte às ferramentas de revisão: prompts, parse da resposta e git diff.

mod diff;
mod parse;
mod prompts;

pub use diff::{collect_git_diff, truncate_to};
pub use parse::parse_structured;
pub use prompts::build_prompt;

//! Construção de prompts de revisão.

use crate::providers::Prompt;
use crate::types::requests::{ProjectContext, ReviewArgs, ReviewKind};

const STRUCTURED_SYSTEM: &str = "You are a senior software engineer performing a code review. \
Be specific and actionable, cite line numbers when possible and do not invent problems.";

const FREEFORM_SYSTEM: &str = "You are a senior software engineer performing a code review. \
Write a clear review in Markdown covering correctness, security, performance, readability and testing.";

const STRUCTURED_FORMAT: &str = r#"Respond with a single JSON object in this format:
{
  "summary": "one paragraph overview",
  "issues": [
    {
      "severity": "info" | "warning" | "error" | "critical",
      "line": 12,
      "category": "bug" | "security" | "performance" | "style" | "maintainability",
      "description": "what is wrong",
      "suggestion": "how to fix it"
    }
  ],
  "strengths": ["what is done well"],
  "recommendations": ["general improvements"],
  "score": 0-100
}
"#;

/// Monta o prompt para o tipo de revisão pedido.
pub fn build_prompt(kind: ReviewKind, args: &ReviewArgs, diff: Option<&str>) -> Prompt {
    let mut user = String::new();

    match args.effective_language() {
        Some(language) => user.push_str(&format!("Review the following {} code", language)),
        None => user.push_str("Review the following code"),
    }
    if let Some(filename) = args.filename.as_deref().filter(|f| !f.trim().is_empty()) {
        user.push_str(&format!(" from `{}`", filename));
    }
    user.push_str(".\n\n");

    if let Some(context) = args.project_context.as_ref().filter(|c| !c.is_empty()) {
        push_context(&mut user, context);
    }

    if !args.code.trim().is_empty() {
        user.push_str("Code:\n```\n");
        user.push_str(&args.code);
        if !args.code.ends_with('\n') {
            user.push('\n');
        }
        user.push_str("```\n\n");
    }

    if let Some(diff) = diff.filter(|d| !d.trim().is_empty()) {
        user.push_str("Uncommitted changes (git diff):\n```diff\n");
        user.push_str(diff);
        if !diff.ends_with('\n') {
            user.push('\n');
        }
        user.push_str("```\n\n");
    }

    match kind {
        ReviewKind::Structured => {
            user.push_str(STRUCTURED_FORMAT);
            Prompt::new(STRUCTURED_SYSTEM, user).with_json_output()
        }
        ReviewKind::Freeform => Prompt::new(FREEFORM_SYSTEM, user),
    }
}

fn push_context(out: &mut String, context: &ProjectContext) {
    out.push_str("Project context:\n");
    if let Some(name) = &context.project_name {
        out.push_str(&format!("- Project: {}\n", name));
    }
    if let Some(description) = &context.description {
        out.push_str(&format!("- Description: {}\n", description));
    }
    if !context.frameworks.is_empty() {
        out.push_str(&format!("- Frameworks: {}\n", context.frameworks.join(", ")));
    }
    if !context.conventions.is_empty() {
        out.push_str(&format!("- Conventions: {}\n", context.conventions.join("; ")));
    }
    if !context.related_files.is_empty() {
        out.push_str(&format!("- Related files: {}\n", context.related_files.join(", ")));
    }
    for (key, value) in &context.extra {
        match value.as_str() {
            Some(text) => out.push_str(&format!("- {}: {}\n", key, text)),
            None => out.push_str(&format!("- {}: {}\n", key, value)),
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_prompt() {
        let args = ReviewArgs::new("fn main() {}").with_filename("src/main.rs");
        let prompt = build_prompt(ReviewKind::Structured, &args, None);

        assert!(prompt.json_output);
        assert!(prompt.user.contains("rust code from `src/main.rs`"));
        assert!(prompt.user.contains("fn main() {}"));
        assert!(prompt.user.contains("\"issues\""));
    }

    #[test]
    fn test_freeform_prompt_with_context_and_diff() {
        let mut context = ProjectContext {
            project_name: Some("critica".into()),
            frameworks: vec!["tokio".into(), "axum".into()],
            ..Default::default()
        };
        context.extra.insert("team".into(), json!("platform"));

        let args = ReviewArgs::new("let x = 1;").with_project_context(context);
        let prompt = build_prompt(ReviewKind::Freeform, &args, Some("+let x = 1;"));

        assert!(!prompt.json_output);
        assert!(prompt.user.contains("- Project: critica"));
        assert!(prompt.user.contains("- Frameworks: tokio, axum"));
        assert!(prompt.user.contains("- team: platform"));
        assert!(prompt.user.contains("```diff\n+let x = 1;\n```"));
        assert!(!prompt.user.contains("\"issues\""));
    }

    #[test]
    fn test_diff_only_prompt() {
        let args = ReviewArgs::default();
        let prompt = build_prompt(ReviewKind::Freeform, &args, Some("-a\n+b\n"));
        assert!(!prompt.user.contains("Code:"));
        assert!(prompt.user.contains("-a\n+b\n```"));
    }
}

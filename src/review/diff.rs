//! Coleta de `git diff` para revisões.

use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use crate::{CriticaError, CriticaResult};

/// Executa `git diff` (ou `git diff --staged`) no repositório indicado.
pub async fn collect_git_diff(repo: &Path, staged: bool, timeout: Duration) -> CriticaResult<String> {
    let mut command = Command::new("git");
    command
        .arg("-C")
        .arg(repo)
        .args(["diff", "--no-color", "--no-ext-diff"])
        .kill_on_drop(true);
    if staged {
        command.arg("--staged");
    }

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| CriticaError::GitDiff(format!("timed out after {}s", timeout.as_secs())))?
        .map_err(|e| CriticaError::GitDiff(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CriticaError::GitDiff(stderr.trim().to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Corta o texto em `max_bytes`, respeitando fronteiras de caractere.
pub fn truncate_to(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_diff_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = collect_git_diff(dir.path(), false, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(CriticaError::GitDiff(_))));
    }

    #[test]
    fn test_truncate_to() {
        assert_eq!(truncate_to("abcdef", 3), "abc");
        assert_eq!(truncate_to("abc", 10), "abc");
        assert_eq!(truncate_to("ééé", 3), "é");
    }
}

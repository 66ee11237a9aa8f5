//! Tipos de requisição do Critica.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Argumentos das ferramentas `reviewCodeStructured` e `reviewCodeFreeform`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewArgs {
    /// Código a ser revisado.
    #[serde(default)]
    pub code: String,

    /// Nome do arquivo de origem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Linguagem do código.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Modelo solicitado (id, id sem distinção de caixa ou chave normalizada).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Contexto do projeto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_context: Option<ProjectContext>,

    /// Anexa a saída de `git diff` ao prompt.
    #[serde(default)]
    pub include_git_diff: bool,

    /// Repositório usado para o diff (padrão: diretório atual).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,

    /// Usa `git diff --staged`.
    #[serde(default)]
    pub staged: bool,
}

impl ReviewArgs {
    /// Cria argumentos para o código informado.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    /// Define a linguagem.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Define o nome do arquivo.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Define o contexto do projeto.
    pub fn with_project_context(mut self, context: ProjectContext) -> Self {
        self.project_context = Some(context);
        self
    }

    /// Linguagem informada ou inferida pela extensão do arquivo.
    pub fn effective_language(&self) -> Option<String> {
        if let Some(language) = self.language.as_deref().filter(|l| !l.trim().is_empty()) {
            return Some(language.trim().to_string());
        }
        let ext = self.filename.as_deref()?.rsplit_once('.')?.1;
        let language = match ext.to_ascii_lowercase().as_str() {
            "rs" => "rust",
            "py" => "python",
            "js" | "mjs" | "cjs" => "javascript",
            "ts" | "tsx" => "typescript",
            "go" => "go",
            "java" => "java",
            "kt" => "kotlin",
            "rb" => "ruby",
            "c" | "h" => "c",
            "cc" | "cpp" | "hpp" => "cpp",
            "cs" => "csharp",
            "swift" => "swift",
            "php" => "php",
            "sh" | "bash" => "shell",
            "sql" => "sql",
            _ => return None,
        };
        Some(language.to_string())
    }
}

/// Contexto opcional do projeto enviado pelo cliente.
///
/// Campos desconhecidos são preservados em `extra` e repassados ao prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conventions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_files: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectContext {
    /// Retorna true se nenhum campo foi preenchido.
    pub fn is_empty(&self) -> bool {
        self.project_name.is_none()
            && self.description.is_none()
            && self.frameworks.is_empty()
            && self.conventions.is_empty()
            && self.related_files.is_empty()
            && self.extra.is_empty()
    }
}

/// Tipo de revisão.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// Resposta JSON validada.
    Structured,
    /// Resposta em texto livre.
    Freeform,
}

impl std::fmt::Display for ReviewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewKind::Structured => write!(f, "structured"),
            ReviewKind::Freeform => write!(f, "freeform"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_review_args_from_camel_case() {
        let args: ReviewArgs = serde_json::from_value(json!({
            "code": "fn main() {}",
            "filename": "main.rs",
            "model": "gemini-1.5-pro",
            "includeGitDiff": true,
            "repoPath": "/tmp/repo",
            "projectContext": {
                "projectName": "demo",
                "frameworks": ["tokio"],
                "team": "core"
            }
        }))
        .unwrap();

        assert_eq!(args.code, "fn main() {}");
        assert!(args.include_git_diff);
        assert!(!args.staged);
        assert_eq!(args.repo_path.as_deref(), Some("/tmp/repo"));

        let context = args.project_context.unwrap();
        assert_eq!(context.project_name.as_deref(), Some("demo"));
        assert_eq!(context.frameworks, vec!["tokio"]);
        assert_eq!(context.extra.get("team"), Some(&json!("core")));
    }

    #[test]
    fn test_missing_code_defaults_to_empty() {
        let args: ReviewArgs = serde_json::from_value(json!({})).unwrap();
        assert!(args.code.is_empty());
        assert!(args.project_context.is_none());
    }

    #[test]
    fn test_effective_language() {
        let args = ReviewArgs::new("x").with_filename("lib.RS");
        assert_eq!(args.effective_language().as_deref(), Some("rust"));

        let args = ReviewArgs::new("x")
            .with_filename("lib.rs")
            .with_language("Rust 2021");
        assert_eq!(args.effective_language().as_deref(), Some("Rust 2021"));

        let args = ReviewArgs::new("x").with_filename("Makefile");
        assert_eq!(args.effective_language(), None);
    }

    #[test]
    fn test_empty_project_context() {
        assert!(ProjectContext::default().is_empty());
    }
}

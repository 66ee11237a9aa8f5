//! Handlers das ferramentas MCP do Critica.
//!
//! 1. `reviewCodeStructured` - Revisão com issues, severidade e nota
//! 2. `reviewCodeFreeform` - Revisão em texto livre (Markdown)
//! 3. `listModels` - Modelos disponíveis nos provedores configurados

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheKeyParts, CacheStats, CachedResult, CachedReview, ReviewCache};
use crate::framing::Sanitizer;
use crate::providers::ProviderRegistry;
use crate::review::{build_prompt, collect_git_diff, parse_structured, truncate_to};
use crate::types::config::{Config, ReviewConfig};
use crate::types::requests::{ReviewArgs, ReviewKind};
use crate::types::responses::{
    FreeformReviewPayload, ModelListPayload, StructuredReviewPayload, ToolErrorPayload,
};
use crate::{CriticaError, CriticaResult};

use super::protocol::{ToolDescription, ToolResult};

pub const REVIEW_CODE_STRUCTURED: &str = "reviewCodeStructured";
pub const REVIEW_CODE_FREEFORM: &str = "reviewCodeFreeform";
pub const LIST_MODELS: &str = "listModels";

/// `modelUsed` de respostas que não chamam nenhum modelo.
const NO_MODEL: &str = "None";

// ═══════════════════════════════════════════════════════════════════════════
// Handler de ferramentas
// ═══════════════════════════════════════════════════════════════════════════

/// Handler das ferramentas MCP do Critica.
pub struct ToolHandler {
    registry: ProviderRegistry,
    cache: Option<Mutex<ReviewCache>>,
    sanitizer: Sanitizer,
    review: ReviewConfig,
}

impl ToolHandler {
    /// Cria o handler a partir da configuração.
    ///
    /// Falha quando nenhum provedor tem API key.
    pub fn new(config: &Config) -> CriticaResult<Self> {
        let registry = ProviderRegistry::from_config(config)?;
        if registry.is_empty() {
            return Err(CriticaError::NoProviderConfigured);
        }
        Ok(Self::with_registry(registry, config))
    }

    /// Cria o handler com um registro de provedores já montado.
    pub fn with_registry(registry: ProviderRegistry, config: &Config) -> Self {
        let cache = config.cache.enabled.then(|| {
            Mutex::new(ReviewCache::new(
                config.cache.capacity,
                Duration::from_secs(config.cache.ttl_secs),
            ))
        });

        Self {
            registry,
            cache,
            sanitizer: Sanitizer::default(),
            review: config.review.clone(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Estatísticas do cache, se habilitado.
    pub async fn cache_stats(&self) -> Option<CacheStats> {
        match &self.cache {
            Some(cache) => Some(cache.lock().await.stats()),
            None => None,
        }
    }

    /// Verifica se a ferramenta existe.
    pub fn has_tool(name: &str) -> bool {
        matches!(name, REVIEW_CODE_STRUCTURED | REVIEW_CODE_FREEFORM | LIST_MODELS)
    }

    /// Lista todas as ferramentas disponíveis.
    pub fn list_tools() -> Vec<ToolDescription> {
        vec![
            ToolDescription::new(
                REVIEW_CODE_STRUCTURED,
                "Review code and return a structured result: summary, issues with severity and line, strengths, recommendations and a 0-100 score.",
                review_input_schema(),
            )
            .with_output_schema(json!({
                "type": "object",
                "properties": {
                    "summary": {"type": "string"},
                    "issues": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "severity": {"type": "string", "enum": ["info", "warning", "error", "critical"]},
                                "line": {"type": "integer"},
                                "category": {"type": "string"},
                                "description": {"type": "string"},
                                "suggestion": {"type": "string"}
                            },
                            "required": ["severity", "description"]
                        }
                    },
                    "strengths": {"type": "array", "items": {"type": "string"}},
                    "recommendations": {"type": "array", "items": {"type": "string"}},
                    "score": {"type": "integer", "minimum": 0, "maximum": 100},
                    "modelUsed": {"type": "string"},
                    "cached": {"type": "boolean"}
                },
                "required": ["summary", "issues", "modelUsed"]
            })),
            ToolDescription::new(
                REVIEW_CODE_FREEFORM,
                "Review code and return the model's review as free-form Markdown text.",
                review_input_schema(),
            )
            .with_output_schema(json!({
                "type": "object",
                "properties": {
                    "review": {"type": "string"},
                    "modelUsed": {"type": "string"},
                    "cached": {"type": "boolean"}
                },
                "required": ["review", "modelUsed"]
            })),
            ToolDescription::new(
                LIST_MODELS,
                "List the models available from the configured LLM providers.",
                json!({
                    "type": "object",
                    "properties": {}
                }),
            )
            .with_output_schema(json!({
                "type": "object",
                "properties": {
                    "availableModels": {"type": "object"},
                    "modelUsed": {"type": "string"}
                },
                "required": ["availableModels", "modelUsed"]
            })),
        ]
    }

    /// Processa uma chamada de ferramenta.
    pub async fn handle_tool_call(&self, name: &str, arguments: Value) -> ToolResult {
        info!(tool = name, "Processing tool call");

        match name {
            REVIEW_CODE_STRUCTURED => self.handle_review(ReviewKind::Structured, arguments).await,
            REVIEW_CODE_FREEFORM => self.handle_review(ReviewKind::Freeform, arguments).await,
            LIST_MODELS => self.handle_list_models(),
            _ => self.error_result(format!("Unknown tool: {}", name)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Handlers individuais
    // ═══════════════════════════════════════════════════════════════════════

    fn handle_list_models(&self) -> ToolResult {
        let payload = ModelListPayload {
            available_models: self.registry.available_models(),
            model_used: NO_MODEL.to_string(),
        };
        self.success(&payload)
    }

    async fn handle_review(&self, kind: ReviewKind, arguments: Value) -> ToolResult {
        // `null` ou argumentos ausentes viram um objeto vazio
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let args: ReviewArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return self.error_result(format!("Invalid parameters: {}", e)),
        };

        match self.review(kind, args).await {
            Ok(result) => result,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Review failed");
                self.error_result(e.to_string())
            }
        }
    }

    async fn review(&self, kind: ReviewKind, args: ReviewArgs) -> CriticaResult<ToolResult> {
        self.validate(&args)?;
        let resolved = self.registry.resolve(args.model.as_deref())?;

        let diff = if args.include_git_diff {
            let repo = args.repo_path.as_deref().unwrap_or(".");
            let diff = collect_git_diff(
                Path::new(repo),
                args.staged,
                Duration::from_secs(self.review.git_diff_timeout_secs),
            )
            .await?;
            Some(truncate_to(&diff, self.review.max_code_bytes).to_string())
        } else {
            None
        };

        if args.code.trim().is_empty() && diff.as_deref().map_or(true, |d| d.trim().is_empty()) {
            return Err(CriticaError::other("Nothing to review: code is empty and git diff has no changes"));
        }

        let language = args.effective_language();
        let key = ReviewCache::cache_key(&CacheKeyParts {
            code: &args.code,
            language: language.as_deref().unwrap_or(""),
            model: &resolved.model,
            kind,
            context: args.project_context.as_ref(),
            diff: diff.as_deref(),
        });

        if let Some(cached) = self.cached(&key).await {
            info!(kind = %kind, model = %cached.model, "Cache hit");
            return Ok(self.review_result(cached.review, cached.model, true));
        }

        let prompt = build_prompt(kind, &args, diff.as_deref());
        let completion = self.registry.complete(&resolved, &prompt).await?;

        let review = match kind {
            ReviewKind::Structured => {
                CachedReview::Structured(parse_structured(&completion.text, &self.sanitizer)?)
            }
            ReviewKind::Freeform => {
                let text = completion.text.trim();
                if text.is_empty() {
                    return Err(CriticaError::other("Model returned an empty review"));
                }
                CachedReview::Freeform(text.to_string())
            }
        };

        if let Some(cache) = &self.cache {
            cache
                .lock()
                .await
                .insert(key, CachedResult::new(review.clone(), resolved.model.clone()));
        }

        Ok(self.review_result(review, resolved.model, false))
    }

    fn validate(&self, args: &ReviewArgs) -> CriticaResult<()> {
        if args.code.trim().is_empty() && !args.include_git_diff {
            return Err(CriticaError::other("Parameter 'code' must not be empty"));
        }
        if args.code.len() > self.review.max_code_bytes {
            return Err(CriticaError::other(format!(
                "Parameter 'code' is {} bytes, the limit is {}",
                args.code.len(),
                self.review.max_code_bytes
            )));
        }
        Ok(())
    }

    async fn cached(&self, key: &str) -> Option<CachedResult> {
        let cache = self.cache.as_ref()?;
        let mut cache = cache.lock().await;
        cache.get(key).cloned()
    }

    fn review_result(&self, review: CachedReview, model_used: String, cached: bool) -> ToolResult {
        match review {
            CachedReview::Structured(review) => self.success(&StructuredReviewPayload {
                review,
                model_used,
                cached,
            }),
            CachedReview::Freeform(review) => self.success(&FreeformReviewPayload {
                review,
                model_used,
                cached,
            }),
        }
    }

    fn success<T: Serialize>(&self, payload: &T) -> ToolResult {
        match serde_json::to_value(payload) {
            Ok(value) => ToolResult::payload(value, false),
            Err(e) => self.error_result(format!("Failed to serialize result: {}", e)),
        }
    }

    /// Resultado de erro com a lista de modelos disponíveis.
    fn error_result(&self, message: impl Into<String>) -> ToolResult {
        let payload = ToolErrorPayload {
            error: message.into(),
            available_models: self.registry.available_models(),
        };
        debug!(error = %payload.error, "Tool error");
        let value = serde_json::to_value(&payload).unwrap_or_else(|_| json!({"error": payload.error}));
        ToolResult::payload(value, true)
    }
}

fn review_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "code": {
                "type": "string",
                "description": "The code to review"
            },
            "filename": {
                "type": "string",
                "description": "Source file name, used for context and language detection"
            },
            "language": {
                "type": "string",
                "description": "Programming language (rust, python, typescript, ...)"
            },
            "model": {
                "type": "string",
                "description": "Model id or key from listModels; defaults to the configured model"
            },
            "projectContext": {
                "type": "object",
                "description": "Project information: projectName, description, frameworks, conventions, relatedFiles",
                "properties": {
                    "projectName": {"type": "string"},
                    "description": {"type": "string"},
                    "frameworks": {"type": "array", "items": {"type": "string"}},
                    "conventions": {"type": "array", "items": {"type": "string"}},
                    "relatedFiles": {"type": "array", "items": {"type": "string"}}
                }
            },
            "includeGitDiff": {
                "type": "boolean",
                "description": "Append the uncommitted git diff of repoPath to the prompt"
            },
            "repoPath": {
                "type": "string",
                "description": "Repository used for the git diff (default: server working directory)"
            },
            "staged": {
                "type": "boolean",
                "description": "Use the staged diff instead of the working tree diff"
            }
        },
        "required": ["code"]
    })
}

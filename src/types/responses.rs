//! Tipos de resposta do Critica.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Revisão estruturada devolvida pelo modelo.
///
/// Os desserializadores são tolerantes: modelos costumam devolver números
/// como string, severidades com nomes variados e listas como texto único.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReview {
    /// Resumo da revisão.
    #[serde(default)]
    pub summary: String,

    /// Problemas encontrados.
    #[serde(default, deserialize_with = "lenient_issues")]
    pub issues: Vec<ReviewIssue>,

    /// Pontos fortes.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub strengths: Vec<String>,

    /// Recomendações gerais.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub recommendations: Vec<String>,

    /// Nota (0-100).
    #[serde(
        default,
        deserialize_with = "lenient_score",
        skip_serializing_if = "Option::is_none"
    )]
    pub score: Option<u8>,
}

impl StructuredReview {
    /// Severidade mais alta entre os problemas.
    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

/// Um problema apontado pela revisão.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewIssue {
    /// Severidade.
    #[serde(default)]
    pub severity: Severity,

    /// Linha afetada.
    #[serde(
        default,
        deserialize_with = "lenient_line",
        skip_serializing_if = "Option::is_none"
    )]
    pub line: Option<u32>,

    /// Categoria (bug, security, performance, style...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Descrição do problema.
    #[serde(default, alias = "issue", alias = "message")]
    pub description: String,

    /// Sugestão de correção.
    #[serde(default, alias = "fix", skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ReviewIssue {
    /// Cria um novo problema.
    pub fn new(severity: Severity, description: impl Into<String>) -> Self {
        Self {
            severity,
            line: None,
            category: None,
            description: description.into(),
            suggestion: None,
        }
    }

    /// Define a linha.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// Severidade de um problema.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informação.
    Info,
    /// Aviso.
    #[default]
    Warning,
    /// Erro.
    Error,
    /// Crítico.
    Critical,
}

impl Severity {
    /// Interpreta nomes usados por diferentes modelos. Nomes desconhecidos
    /// viram `Warning`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" | "low" | "minor" | "note" | "nit" | "suggestion" | "style" => Severity::Info,
            "error" | "high" | "major" | "bug" => Severity::Error,
            "critical" | "blocker" | "severe" | "security" => Severity::Critical,
            _ => Severity::Warning,
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => Severity::parse_lenient(&s),
            _ => Severity::Warning,
        })
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

fn lenient_issues<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ReviewIssue>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(ReviewIssue::new(Severity::Warning, text)),
            other => serde_json::from_value(other).ok(),
        })
        .collect())
}

fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

fn lenient_line<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        // "12", "12-14", "L12"
        Value::String(s) => s
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .and_then(|digits| digits.parse().ok()),
        _ => None,
    })
}

fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(score
        .filter(|s| s.is_finite())
        .map(|s| s.round().clamp(0.0, 100.0) as u8))
}

/// Payload de `reviewCodeStructured`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReviewPayload {
    #[serde(flatten)]
    pub review: StructuredReview,
    pub model_used: String,
    pub cached: bool,
}

/// Payload de `reviewCodeFreeform`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FreeformReviewPayload {
    pub review: String,
    pub model_used: String,
    pub cached: bool,
}

/// Resumo de um modelo disponível.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    /// Id usado pelo provedor.
    pub id: String,
    /// Nome do provedor.
    pub provider: String,
    /// Nome de exibição.
    pub display_name: String,
}

/// Mapa de modelos disponíveis, indexado pela chave normalizada.
pub type AvailableModels = BTreeMap<String, ModelSummary>;

/// Payload de `listModels`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelListPayload {
    pub available_models: AvailableModels,
    pub model_used: String,
}

/// Payload de erro das ferramentas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorPayload {
    pub error: String,
    pub available_models: AvailableModels,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_lenient() {
        assert_eq!(Severity::parse_lenient("HIGH"), Severity::Error);
        assert_eq!(Severity::parse_lenient("minor"), Severity::Info);
        assert_eq!(Severity::parse_lenient("Critical"), Severity::Critical);
        assert_eq!(Severity::parse_lenient("whatever"), Severity::Warning);
        assert!(Severity::Critical > Severity::Info);
    }

    #[test]
    fn test_structured_review_lenient_fields() {
        let review: StructuredReview = serde_json::from_value(json!({
            "summary": "ok",
            "issues": [
                {"severity": "high", "line": "12-14", "description": "off by one"},
                {"severity": 3, "line": 7, "issue": "naming"},
                "loose text issue"
            ],
            "strengths": "readable",
            "recommendations": null,
            "score": "85%"
        }))
        .unwrap();

        assert_eq!(review.issues.len(), 3);
        assert_eq!(review.issues[0].severity, Severity::Error);
        assert_eq!(review.issues[0].line, Some(12));
        assert_eq!(review.issues[1].severity, Severity::Warning);
        assert_eq!(review.issues[1].description, "naming");
        assert_eq!(review.issues[2].description, "loose text issue");
        assert_eq!(review.strengths, vec!["readable"]);
        assert!(review.recommendations.is_empty());
        assert_eq!(review.score, Some(85));
        assert_eq!(review.max_severity(), Some(Severity::Error));
    }

    #[test]
    fn test_score_is_clamped() {
        let review: StructuredReview =
            serde_json::from_value(json!({"summary": "x", "score": 140.4})).unwrap();
        assert_eq!(review.score, Some(100));
    }

    #[test]
    fn test_structured_payload_shape() {
        let payload = StructuredReviewPayload {
            review: StructuredReview {
                summary: "fine".into(),
                issues: vec![ReviewIssue::new(Severity::Info, "nit").with_line(3)],
                ..Default::default()
            },
            model_used: "gpt-4o".into(),
            cached: false,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["summary"], "fine");
        assert_eq!(value["issues"][0]["severity"], "info");
        assert_eq!(value["issues"][0]["line"], 3);
        assert!(value["issues"][0].get("category").is_none());
        assert_eq!(value["modelUsed"], "gpt-4o");
        assert_eq!(value["cached"], false);
        assert!(value.get("score").is_none());
    }
}

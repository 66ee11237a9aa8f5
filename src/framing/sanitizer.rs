//! Sanitizer de framing: repara JSON malformado com as regras de
//! [`super::rules`] até que o texto seja parseável.

use serde::de::IgnoredAny;
use std::borrow::Cow;
use tracing::{debug, error};

use super::rules::{builtin_rules, RepairRule};

const PREVIEW_CHARS: usize = 80;

/// Resultado de uma tentativa de reparo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// O texto já era JSON válido e foi devolvido sem alteração.
    AlreadyValid,
    /// Uma ou mais regras tornaram o texto um documento válido.
    Repaired,
    /// O texto é uma sequência de documentos válidos (ex.: `}{` separado).
    Split,
    /// Nenhuma combinação de regras produziu JSON válido.
    Unrepaired,
}

/// Texto reparado e as regras aplicadas.
#[derive(Debug, Clone)]
pub struct Repair {
    pub text: String,
    pub applied: Vec<&'static str>,
    pub outcome: RepairOutcome,
}

impl Repair {
    /// Retorna true se o texto final é parseável (documento único ou sequência).
    pub fn is_parseable(&self) -> bool {
        self.outcome != RepairOutcome::Unrepaired
    }
}

/// Aplica regras de reparo em ordem de prioridade.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    rules: Vec<RepairRule>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::with_rules(builtin_rules().to_vec())
    }
}

impl Sanitizer {
    /// Sanitizer com as regras embutidas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitizer sem regras: apenas classifica o texto.
    pub fn disabled() -> Self {
        Self::with_rules(Vec::new())
    }

    /// Sanitizer com uma tabela de regras própria.
    pub fn with_rules(rules: Vec<RepairRule>) -> Self {
        Self { rules }
    }

    /// Regras ativas, em ordem.
    pub fn rules(&self) -> &[RepairRule] {
        &self.rules
    }

    /// Devolve o texto reparado (ou o original, se já válido).
    pub fn sanitize(&self, text: &str) -> String {
        self.repair(text).text
    }

    /// Tenta reparar `text`.
    ///
    /// Texto já parseável nunca é tocado. Depois de cada regra aplicada o
    /// texto é reparseado e as regras seguintes são ignoradas assim que ele
    /// for válido. Nunca falha: o melhor esforço é devolvido mesmo sem reparo.
    pub fn repair(&self, text: &str) -> Repair {
        if parses(text) {
            return Repair {
                text: text.to_string(),
                applied: Vec::new(),
                outcome: RepairOutcome::AlreadyValid,
            };
        }

        let mut current = text.to_string();
        let mut applied = Vec::new();

        for rule in &self.rules {
            if !rule.matches(&current) {
                continue;
            }
            let next = match rule.apply(&current) {
                Cow::Owned(next) if next != current => next,
                _ => continue,
            };

            debug!(
                rule = rule.name(),
                before = %preview(&current),
                after = %preview(&next),
                "Applied repair rule"
            );
            current = next;
            applied.push(rule.name());

            if parses(&current) {
                return Repair {
                    text: current,
                    applied,
                    outcome: RepairOutcome::Repaired,
                };
            }
            if parses_as_stream(&current) {
                return Repair {
                    text: current,
                    applied,
                    outcome: RepairOutcome::Split,
                };
            }
        }

        if parses_as_stream(&current) {
            return Repair {
                text: current,
                applied,
                outcome: RepairOutcome::Split,
            };
        }

        if current.trim().is_empty() {
            debug!("Blank payload, nothing to repair");
        } else {
            error!(
                rules_applied = ?applied,
                original = %preview(text),
                result = %preview(&current),
                "Payload is not valid JSON after repair"
            );
        }

        Repair {
            text: current,
            applied,
            outcome: RepairOutcome::Unrepaired,
        }
    }
}

/// Atalho para [`Sanitizer::sanitize`] com as regras embutidas.
pub fn sanitize(text: &str) -> String {
    Sanitizer::default().sanitize(text)
}

/// Documento JSON único e completo.
pub(crate) fn parses(text: &str) -> bool {
    serde_json::from_str::<IgnoredAny>(text).is_ok()
}

/// Dois ou mais documentos consecutivos, todos válidos.
pub(crate) fn parses_as_stream(text: &str) -> bool {
    let mut count = 0usize;
    for item in serde_json::Deserializer::from_str(text).into_iter::<IgnoredAny>() {
        if item.is_err() {
            return false;
        }
        count += 1;
    }
    count >= 2
}

/// Prefixo curto para logs, cortado em fronteira de caractere.
pub(crate) fn preview(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => Cow::Owned(format!("{}...", &text[..idx])),
        None => Cow::Borrowed(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const VALID_CORPUS: &[&str] = &[
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
        r#"[ "a", "b"]"#,
        r#"{"text": "it's [ spaced ] and {braced}, ,"}"#,
        r#"{"a": [   ], "b": {"c": null}}"#,
        "  [1, 2, 3]  ",
        r#""just a string""#,
        "42",
        "null",
    ];

    #[test]
    fn test_valid_json_is_unchanged() {
        let sanitizer = Sanitizer::default();
        for input in VALID_CORPUS {
            let repair = sanitizer.repair(input);
            assert_eq!(repair.text, *input);
            assert_eq!(repair.outcome, RepairOutcome::AlreadyValid);
            assert!(repair.applied.is_empty());
        }
    }

    #[test]
    fn test_never_panics() {
        let inputs = [
            "", " ", "{", "}", "[", "]", "'", "\"", "\\", "{{{{", "]]]]", ",,,,",
            "{'a':", "[\"a\" \"", "ção 🚀 {", "{\"a\":\"\\", "\u{0}", "'''", "[ ,, ]",
        ];
        for input in inputs {
            let _ = sanitize(input);
        }
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_adjacent_tokens_repaired() {
        let repaired = sanitize(r#"["a" "b"]"#);
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value, json!(["a", "b"]));
    }

    #[test]
    fn test_leading_space_array_already_valid() {
        let input = r#"[ "a", "b"]"#;
        let output = sanitize(input);
        assert_eq!(output, input);
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value, json!(["a", "b"]));
    }

    #[test]
    fn test_concatenated_objects_are_split() {
        let repair = Sanitizer::default().repair(r#"{"a":1}{"b":2}"#);
        assert_eq!(repair.outcome, RepairOutcome::Split);
        assert_eq!(repair.applied, vec!["concatenated_documents"]);

        let parts: Vec<Value> = repair
            .text
            .split('\n')
            .map(|part| serde_json::from_str(part).unwrap())
            .collect();
        assert_eq!(parts, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn test_stops_after_first_successful_rule() {
        let repair = Sanitizer::default().repair("[1, 2, ]");
        assert_eq!(repair.outcome, RepairOutcome::Repaired);
        assert_eq!(repair.applied, vec!["trailing_array_comma"]);
    }

    #[test]
    fn test_model_style_object() {
        let repair = Sanitizer::default()
            .repair("{summary: 'Looks fine', issues: [], strengths: ['clear naming'], recommendations: []}");
        assert_eq!(repair.outcome, RepairOutcome::Repaired);
        assert_eq!(repair.applied, vec!["unquoted_keys", "single_quoted_strings"]);

        let value: Value = serde_json::from_str(&repair.text).unwrap();
        assert_eq!(value["summary"], "Looks fine");
        assert_eq!(value["strengths"], json!(["clear naming"]));
    }

    #[test]
    fn test_unrepairable_returns_best_effort() {
        let repair = Sanitizer::default().repair("{not json at all");
        assert_eq!(repair.outcome, RepairOutcome::Unrepaired);
        assert!(!repair.is_parseable());
        assert!(!repair.text.is_empty());
    }

    #[test]
    fn test_disabled_sanitizer_only_classifies() {
        let sanitizer = Sanitizer::disabled();
        assert!(sanitizer.rules().is_empty());
        let repair = sanitizer.repair(r#"["a" "b"]"#);
        assert_eq!(repair.text, r#"["a" "b"]"#);
        assert_eq!(repair.outcome, RepairOutcome::Unrepaired);
    }

    #[test]
    fn test_whitespace_only_literal_is_rewritten_during_repair() {
        // documento válido: o literal fica intacto
        let valid = r#"{"sep": " ", "x": [1,2]}"#;
        assert_eq!(Sanitizer::new().repair(valid).outcome, RepairOutcome::AlreadyValid);

        // quebrado por outro motivo: `" "` é lido como separador de strings
        let repair = Sanitizer::new().repair(r#"{"sep": " ", "x": [1,,2]}"#);
        assert_eq!(repair.outcome, RepairOutcome::Repaired);
        assert_eq!(
            repair.applied,
            vec!["whitespace_separated_strings", "duplicate_commas"]
        );
        let value: Value = serde_json::from_str(&repair.text).unwrap();
        assert_eq!(value["sep"], ",");
        assert_eq!(value["x"], json!([1, 2]));
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let text = "é".repeat(200);
        let short = preview(&text);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}

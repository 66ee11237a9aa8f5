//! Regras de reparo de JSON.
//!
//! Cada regra é uma transformação nomeada `{nome, padrão, substituição}`.
//! A ordem de [`builtin_rules`] é a prioridade de aplicação.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Como o texto casado é substituído.
#[derive(Clone, Copy)]
pub enum Replacement {
    /// Template no formato do `regex` (`$1`, `${name}`).
    Template(&'static str),
    /// Função calculada a partir das capturas.
    Computed(fn(&Captures<'_>) -> String),
}

impl std::fmt::Debug for Replacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Replacement::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Replacement::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Quantas ocorrências são substituídas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Todas as ocorrências.
    All,
    /// Apenas a primeira.
    First,
}

/// Uma regra de reparo.
#[derive(Debug, Clone)]
pub struct RepairRule {
    name: &'static str,
    pattern: Regex,
    replacement: Replacement,
    scope: Scope,
}

impl RepairRule {
    /// Cria uma regra. Falha se o padrão não for uma regex válida.
    pub fn new(
        name: &'static str,
        pattern: &str,
        replacement: Replacement,
        scope: Scope,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(pattern)?,
            replacement,
            scope,
        })
    }

    /// Nome da regra (usado nos logs e em [`super::Repair::applied`]).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Retorna true se o padrão ocorre no texto.
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Aplica a regra. Devolve `Cow::Borrowed` quando nada muda.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match (self.replacement, self.scope) {
            (Replacement::Template(t), Scope::All) => self.pattern.replace_all(text, t),
            (Replacement::Template(t), Scope::First) => self.pattern.replace(text, t),
            (Replacement::Computed(f), Scope::All) => self.pattern.replace_all(text, f),
            (Replacement::Computed(f), Scope::First) => self.pattern.replace(text, f),
        }
    }
}

fn builtin(name: &'static str, pattern: &str, replacement: Replacement, scope: Scope) -> RepairRule {
    RepairRule::new(name, pattern, replacement, scope).expect("valid built-in repair pattern")
}

/// `'it\'s "x"'` → `"it's \"x\""`
fn single_to_double_quoted(caps: &Captures<'_>) -> String {
    let inner = &caps[1];
    let mut out = String::with_capacity(inner.len() + 2);
    out.push('"');
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

static BUILTIN_RULES: LazyLock<Vec<RepairRule>> = LazyLock::new(|| {
    use Replacement::{Computed, Template};
    vec![
        builtin(
            "adjacent_quoted_tokens",
            r#"\[\s*(["'])([^"'\\]*)(["'])\s*(["'])"#,
            Template("[${1}${2}${3},${4}"),
            Scope::All,
        ),
        builtin("open_bracket_whitespace", r"\[\s+", Template("["), Scope::All),
        // Também casa um literal só de espaços (`" "`), que vira `","`.
        builtin("whitespace_separated_strings", r#""\s+""#, Template(r#"",""#), Scope::All),
        builtin("concatenated_documents", r"\}[ \t]*\{", Template("}\n{"), Scope::All),
        builtin("blank_array", r"\[\s+\]", Template("[]"), Scope::All),
        // Clientes que erram o offset do primeiro colchete por alguns caracteres.
        builtin(
            "leading_bracket_whitespace",
            r"^([^\[]{0,8}\[)\s+",
            Template("${1}"),
            Scope::First,
        ),
        builtin("trailing_array_comma", r",\s*\]", Template("]"), Scope::All),
        builtin("duplicate_commas", r",(\s*,)+", Template(","), Scope::All),
        builtin(
            "unquoted_keys",
            r"([\{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)",
            Template(r#"${1}"${2}"${3}"#),
            Scope::All,
        ),
        builtin(
            "single_quoted_strings",
            r"'((?:[^'\\]|\\.)*)'",
            Computed(single_to_double_quoted),
            Scope::All,
        ),
    ]
});

/// Regras embutidas, em ordem de prioridade.
pub fn builtin_rules() -> &'static [RepairRule] {
    &BUILTIN_RULES
}

/// Busca uma regra embutida pelo nome.
pub fn builtin_rule(name: &str) -> Option<&'static RepairRule> {
    builtin_rules().iter().find(|rule| rule.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(name: &str, input: &str) -> String {
        builtin_rule(name).unwrap().apply(input).into_owned()
    }

    #[test]
    fn test_builtin_order() {
        let names: Vec<_> = builtin_rules().iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            vec![
                "adjacent_quoted_tokens",
                "open_bracket_whitespace",
                "whitespace_separated_strings",
                "concatenated_documents",
                "blank_array",
                "leading_bracket_whitespace",
                "trailing_array_comma",
                "duplicate_commas",
                "unquoted_keys",
                "single_quoted_strings",
            ]
        );
    }

    #[test]
    fn test_adjacent_quoted_tokens() {
        assert_eq!(apply("adjacent_quoted_tokens", r#"["a" "b"]"#), r#"["a","b"]"#);
        assert_eq!(apply("adjacent_quoted_tokens", r#"['a''b']"#), r#"['a','b']"#);
        assert_eq!(apply("adjacent_quoted_tokens", r#"["a","b"]"#), r#"["a","b"]"#);
    }

    #[test]
    fn test_whitespace_rules() {
        assert_eq!(apply("open_bracket_whitespace", "[  1, 2]"), "[1, 2]");
        assert_eq!(apply("whitespace_separated_strings", r#"["a"   "b" "c"]"#), r#"["a","b","c"]"#);
        assert_eq!(apply("blank_array", r#"{"a": [   ]}"#), r#"{"a": []}"#);
        assert_eq!(apply("leading_bracket_whitespace", "{\"a\":[  1]}"), "{\"a\":[1]}");
        assert_eq!(apply("leading_bracket_whitespace", "{\"long_key\":[ 1]}"), "{\"long_key\":[ 1]}");
    }

    #[test]
    fn test_concatenated_documents() {
        assert_eq!(apply("concatenated_documents", r#"{"a":1}{"b":2}"#), "{\"a\":1}\n{\"b\":2}");
        assert_eq!(apply("concatenated_documents", r#"{"a":1} {"b":2}"#), "{\"a\":1}\n{\"b\":2}");
    }

    #[test]
    fn test_comma_rules() {
        assert_eq!(apply("trailing_array_comma", "[1, 2, ]"), "[1, 2]");
        assert_eq!(apply("duplicate_commas", "[1,, 2, ,3]"), "[1, 2,3]");
    }

    #[test]
    fn test_unquoted_keys() {
        assert_eq!(
            apply("unquoted_keys", "{summary: \"x\", score : 3}"),
            "{\"summary\": \"x\", \"score\" : 3}"
        );
    }

    #[test]
    fn test_single_quoted_strings() {
        assert_eq!(apply("single_quoted_strings", "['a', 'b']"), r#"["a", "b"]"#);
        assert_eq!(
            apply("single_quoted_strings", r#"{"k": 'it\'s "ok"'}"#),
            r#"{"k": "it's \"ok\""}"#
        );
    }

    #[test]
    fn test_apply_without_match_borrows() {
        let rule = builtin_rule("duplicate_commas").unwrap();
        assert!(!rule.matches("[1,2]"));
        assert!(matches!(rule.apply("[1,2]"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_custom_rule() {
        let rule = RepairRule::new("nan_to_null", r"\bNaN\b", Replacement::Template("null"), Scope::All)
            .unwrap();
        assert_eq!(rule.apply("[NaN, 1]"), "[null, 1]");
        assert!(RepairRule::new("broken", "(", Replacement::Template(""), Scope::All).is_err());
    }
}

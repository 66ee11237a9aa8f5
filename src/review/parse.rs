//! Extração da revisão estruturada a partir do texto do modelo.

use tracing::debug;

use crate::framing::Sanitizer;
use crate::types::responses::StructuredReview;
use crate::{CriticaError, CriticaResult};

/// Parseia a resposta do modelo como [`StructuredReview`].
///
/// Aceita blocos ```json, texto antes/depois do objeto e JSON malformado
/// que o sanitizer consiga reparar.
pub fn parse_structured(text: &str, sanitizer: &Sanitizer) -> CriticaResult<StructuredReview> {
    let candidate = extract_object(text)
        .ok_or_else(|| CriticaError::other("Model response does not contain a JSON object"))?;

    let repair = sanitizer.repair(candidate);
    if !repair.applied.is_empty() {
        debug!(rules = ?repair.applied, "Repaired model JSON");
    }

    let review: StructuredReview = serde_json::from_str(&repair.text)?;
    if review.summary.trim().is_empty() && review.issues.is_empty() {
        return Err(CriticaError::other(
            "Model response has neither a summary nor issues",
        ));
    }
    Ok(review)
}

/// Do primeiro `{` ao último `}`, ignorando cercas de código.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

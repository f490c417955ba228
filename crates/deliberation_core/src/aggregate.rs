//! crates/deliberation_core/src/aggregate.rs
//!
//! Live opinion-distribution aggregation: a pure read reduction over the
//! response ledger. Recomputed on every call; the result is never cached or
//! stored, because callers rely on fresh data for a live chart.

use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::ResponsePolicy;
use crate::ports::{PortResult, SurveyStore};

/// Computes the answer-frequency table for one question.
///
/// Scans the responses selected by `ResponsePolicy::OriginalOnly`, groups by
/// the scalar category embedded in each payload, and counts occurrences.
/// Payloads without a recognizable category are silently skipped, not
/// counted and not an error.
pub async fn distribution(
    store: &dyn SurveyStore,
    question_id: Uuid,
) -> PortResult<BTreeMap<String, u64>> {
    let rows = store
        .responses_for_question(question_id, ResponsePolicy::OriginalOnly)
        .await?;

    let mut counts = BTreeMap::new();
    for row in rows {
        if let Some(category) = answer_category(&row.value) {
            *counts.entry(category).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

/// Extracts the question-type-specific scalar used for aggregation.
///
/// A bare JSON number counts as its own category; an object counts by its
/// `likert` field. Anything else (free text, malformed payloads) has no
/// category.
fn answer_category(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("likert").and_then(Value::as_i64).map(|n| n.to_string()),
        _ => None,
    }
}

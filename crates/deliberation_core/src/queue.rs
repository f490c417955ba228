//! crates/deliberation_core/src/queue.rs
//!
//! Anonymized peer-voting queue selection with exclusion rules.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::ResponsePolicy;
use crate::ports::{PortResult, SurveyStore};

/// Responses offered to a voter by default.
pub const DEFAULT_BATCH_LIMIT: usize = 10;

/// A peer response eligible for evaluation. Deliberately excludes the
/// authoring session: candidates are anonymous to the voter.
#[derive(Debug, Clone)]
pub struct VoteCandidate {
    pub id: Uuid,
    pub value: Value,
    pub created_at: DateTime<Utc>,
}

/// Derives the next batch of peer responses the given voter may evaluate.
///
/// Exclusion rules, applied over the survey's non-edit responses:
/// responses the voter has already voted on, and the voter's own responses.
/// Ordering is newest first (deterministic); the result is truncated to
/// `limit`. An exhausted pool yields an empty batch, never an error; the
/// caller decides what "no more to evaluate" means.
pub async fn next_batch(
    store: &dyn SurveyStore,
    survey_id: Uuid,
    voter_session_id: Uuid,
    limit: usize,
) -> PortResult<Vec<VoteCandidate>> {
    let voted: HashSet<Uuid> = store
        .voted_response_ids(voter_session_id)
        .await?
        .into_iter()
        .collect();
    let own: HashSet<Uuid> = store
        .response_ids_for_session(voter_session_id)
        .await?
        .into_iter()
        .collect();

    let pool = store
        .responses_for_survey(survey_id, ResponsePolicy::OriginalOnly)
        .await?;

    Ok(pool
        .into_iter()
        .filter(|r| !voted.contains(&r.id) && !own.contains(&r.id))
        .take(limit)
        .map(|r| VoteCandidate {
            id: r.id,
            value: r.value,
            created_at: r.created_at,
        })
        .collect())
}

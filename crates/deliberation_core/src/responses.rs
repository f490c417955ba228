//! crates/deliberation_core/src/responses.rs
//!
//! Submit/revise operations over the append-only response ledger, including
//! the edit-lineage rules.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::Response;
use crate::ports::{PortResult, SurveyStore};

/// Records a new, non-edit response. Fails only if the underlying store is
/// unavailable. The caller is responsible for following a successful submit
/// with a distribution recompute and broadcast.
pub async fn submit(
    store: &dyn SurveyStore,
    question_id: Uuid,
    session_id: Uuid,
    value: Value,
) -> PortResult<Response> {
    store
        .insert_response(question_id, session_id, value, None)
        .await
}

/// Records a revision of an existing response.
///
/// Fails with `NotFound` if the original does not exist, creating no row.
/// The new row carries `edited_from_id = original_id` and the original's
/// question and session identity; a revision can never move an answer to a
/// different question or participant. Chains may be arbitrarily long
/// (revising a revision is allowed), and every row with a non-null
/// `edited_from_id` stays out of aggregation and peer voting.
pub async fn revise(
    store: &dyn SurveyStore,
    original_id: Uuid,
    value: Value,
) -> PortResult<Response> {
    let original = store.get_response(original_id).await?;
    store
        .insert_response(
            original.question_id,
            original.session_id,
            value,
            Some(original.id),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::ports::PortError;
    use serde_json::json;

    #[tokio::test]
    async fn revise_keeps_question_and_session_of_the_original() {
        let store = InMemoryStore::new();
        let session = store.create_session(Uuid::new_v4(), None).await.unwrap();
        let question = Uuid::new_v4();

        let first = submit(&store, question, session.id, json!({"likert": 2}))
            .await
            .unwrap();
        let edit = revise(&store, first.id, json!({"likert": 5}))
            .await
            .unwrap();

        assert_eq!(edit.question_id, first.question_id);
        assert_eq!(edit.session_id, first.session_id);
        assert_eq!(edit.edited_from_id, Some(first.id));
        assert!(edit.is_edit());
        assert!(!first.is_edit());
    }

    #[tokio::test]
    async fn revise_unknown_id_is_not_found_and_creates_no_row() {
        let store = InMemoryStore::new();
        let session = store.create_session(Uuid::new_v4(), None).await.unwrap();

        let err = revise(&store, Uuid::new_v4(), json!({"likert": 3}))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));

        let rows = store.response_ids_for_session(session.id).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn edit_chains_can_be_extended_repeatedly() {
        let store = InMemoryStore::new();
        let session = store.create_session(Uuid::new_v4(), None).await.unwrap();
        let question = Uuid::new_v4();

        let first = submit(&store, question, session.id, json!({"likert": 1}))
            .await
            .unwrap();
        let second = revise(&store, first.id, json!({"likert": 2})).await.unwrap();
        let third = revise(&store, second.id, json!({"likert": 3})).await.unwrap();

        assert_eq!(third.edited_from_id, Some(second.id));
        assert_eq!(second.edited_from_id, Some(first.id));
        // The full history is retained.
        let ids = store.response_ids_for_session(session.id).await.unwrap();
        assert_eq!(ids.len(), 3);
    }
}

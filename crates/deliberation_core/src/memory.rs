//! crates/deliberation_core/src/memory.rs
//!
//! A complete in-memory `SurveyStore` over mutex'd append-only ledgers.
//! Deterministic and dependency-free, it backs every unit test and lets the
//! API service run without a database.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    new_session_key, AiChat, AiConversationRating, Persona, PlatformFeedback, Response,
    ResponsePolicy, Session, Vote, VoteCategory,
};
use crate::ports::{PortError, PortResult, SurveyStore};

#[derive(Default)]
struct Ledgers {
    sessions: HashMap<Uuid, Session>,
    /// Responses in insertion order; rows are never mutated or removed.
    responses: Vec<Response>,
    votes: Vec<Vote>,
    chats: HashMap<Uuid, AiChat>,
    feedback: Vec<PlatformFeedback>,
}

/// In-memory store. Share via `Arc` when multiple components must observe
/// the same ledgers.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Ledgers>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledgers {
    fn policy_filter(&self, r: &Response, policy: ResponsePolicy) -> bool {
        match policy {
            ResponsePolicy::OriginalOnly => r.edited_from_id.is_none(),
            ResponsePolicy::Latest => !self
                .responses
                .iter()
                .any(|other| other.edited_from_id == Some(r.id)),
        }
    }
}

#[async_trait]
impl SurveyStore for InMemoryStore {
    async fn create_session(&self, survey_id: Uuid, locale: Option<&str>) -> PortResult<Session> {
        let session = Session {
            id: Uuid::new_v4(),
            survey_id,
            session_key: new_session_key(),
            locale: locale.map(str::to_string),
            created_at: Utc::now(),
            completed_at: None,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn complete_session(&self, session_id: Uuid) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        session.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn insert_response(
        &self,
        question_id: Uuid,
        session_id: Uuid,
        value: Value,
        edited_from_id: Option<Uuid>,
    ) -> PortResult<Response> {
        let response = Response {
            id: Uuid::new_v4(),
            question_id,
            session_id,
            value,
            edited_from_id,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock().unwrap();
        if let Some(original_id) = edited_from_id {
            if !inner.responses.iter().any(|r| r.id == original_id) {
                return Err(PortError::NotFound(format!(
                    "Response {} not found",
                    original_id
                )));
            }
        }
        inner.responses.push(response.clone());
        Ok(response)
    }

    async fn get_response(&self, response_id: Uuid) -> PortResult<Response> {
        let inner = self.inner.lock().unwrap();
        inner
            .responses
            .iter()
            .find(|r| r.id == response_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Response {} not found", response_id)))
    }

    async fn responses_for_question(
        &self,
        question_id: Uuid,
        policy: ResponsePolicy,
    ) -> PortResult<Vec<Response>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .responses
            .iter()
            .rev() // newest first
            .filter(|r| r.question_id == question_id && inner.policy_filter(r, policy))
            .cloned()
            .collect())
    }

    async fn responses_for_survey(
        &self,
        survey_id: Uuid,
        policy: ResponsePolicy,
    ) -> PortResult<Vec<Response>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .responses
            .iter()
            .rev()
            .filter(|r| {
                inner
                    .sessions
                    .get(&r.session_id)
                    .is_some_and(|s| s.survey_id == survey_id)
                    && inner.policy_filter(r, policy)
            })
            .cloned()
            .collect())
    }

    async fn response_ids_for_session(&self, session_id: Uuid) -> PortResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .responses
            .iter()
            .filter(|r| r.session_id == session_id)
            .map(|r| r.id)
            .collect())
    }

    async fn insert_vote(
        &self,
        target_response_id: Uuid,
        session_id: Uuid,
        category: VoteCategory,
        reason: Option<&str>,
    ) -> PortResult<Vote> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.responses.iter().any(|r| r.id == target_response_id) {
            return Err(PortError::NotFound(format!(
                "Response {} not found",
                target_response_id
            )));
        }
        let vote = Vote {
            id: Uuid::new_v4(),
            target_response_id,
            session_id,
            category,
            reason: reason.map(str::to_string),
            created_at: Utc::now(),
        };
        inner.votes.push(vote.clone());
        Ok(vote)
    }

    async fn voted_response_ids(&self, session_id: Uuid) -> PortResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .votes
            .iter()
            .filter(|v| v.session_id == session_id)
            .map(|v| v.target_response_id)
            .collect())
    }

    async fn create_chat(
        &self,
        session_id: Uuid,
        persona: Persona,
        initial_context: &str,
        opening_line: &str,
    ) -> PortResult<AiChat> {
        let now = Utc::now();
        let chat = AiChat {
            id: Uuid::new_v4(),
            session_id,
            persona,
            turn_index: 0,
            last_user_message: Some(initial_context.to_string()),
            last_ai_response: Some(opening_line.to_string()),
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<AiChat> {
        let inner = self.inner.lock().unwrap();
        inner
            .chats
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Chat {} not found", chat_id)))
    }

    async fn complete_chat_turn(
        &self,
        chat_id: Uuid,
        user_message: &str,
        ai_response: &str,
    ) -> PortResult<AiChat> {
        let mut inner = self.inner.lock().unwrap();
        let chat = inner
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| PortError::NotFound(format!("Chat {} not found", chat_id)))?;
        chat.turn_index += 1;
        chat.last_user_message = Some(user_message.to_string());
        chat.last_ai_response = Some(ai_response.to_string());
        chat.updated_at = Utc::now();
        Ok(chat.clone())
    }

    async fn insert_feedback(
        &self,
        session_id: Uuid,
        experience_rating: i32,
        ai_conversation_rating: Option<AiConversationRating>,
        suggestions: Option<&str>,
    ) -> PortResult<PlatformFeedback> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.sessions.contains_key(&session_id) {
            return Err(PortError::NotFound(format!(
                "Session {} not found",
                session_id
            )));
        }
        let feedback = PlatformFeedback {
            id: Uuid::new_v4(),
            session_id,
            experience_rating,
            ai_conversation_rating,
            suggestions: suggestions.map(str::to_string),
            created_at: Utc::now(),
        };
        inner.feedback.push(feedback.clone());
        Ok(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_keys_are_short_and_uppercase() {
        let store = InMemoryStore::new();
        let session = store.create_session(Uuid::new_v4(), Some("en")).await.unwrap();
        assert_eq!(session.session_key.len(), 8);
        assert_eq!(session.session_key, session.session_key.to_uppercase());
        assert_eq!(session.locale.as_deref(), Some("en"));
        assert!(session.completed_at.is_none());
    }

    #[tokio::test]
    async fn completing_a_session_only_stamps_completed_at() {
        let store = InMemoryStore::new();
        let session = store.create_session(Uuid::new_v4(), None).await.unwrap();
        store.complete_session(session.id).await.unwrap();

        let reread = store.get_session(session.id).await.unwrap();
        assert!(reread.completed_at.is_some());
        assert_eq!(reread.session_key, session.session_key);
        assert_eq!(reread.survey_id, session.survey_id);
    }

    #[tokio::test]
    async fn latest_policy_selects_leaves_of_edit_chains() {
        let store = InMemoryStore::new();
        let session = store.create_session(Uuid::new_v4(), None).await.unwrap();
        let question = Uuid::new_v4();

        let first = store
            .insert_response(question, session.id, serde_json::json!({"likert": 1}), None)
            .await
            .unwrap();
        let second = store
            .insert_response(
                question,
                session.id,
                serde_json::json!({"likert": 2}),
                Some(first.id),
            )
            .await
            .unwrap();

        let originals = store
            .responses_for_question(question, ResponsePolicy::OriginalOnly)
            .await
            .unwrap();
        assert_eq!(originals.len(), 1);
        assert_eq!(originals[0].id, first.id);

        let latest = store
            .responses_for_question(question, ResponsePolicy::Latest)
            .await
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, second.id);
    }

    #[tokio::test]
    async fn chat_turns_increment_monotonically() {
        let store = InMemoryStore::new();
        let session = store.create_session(Uuid::new_v4(), None).await.unwrap();
        let chat = store
            .create_chat(session.id, Persona::Socratic, "climate policy", Persona::Socratic.opening_line())
            .await
            .unwrap();
        assert_eq!(chat.turn_index, 0);

        let after_one = store
            .complete_chat_turn(chat.id, "why?", "because")
            .await
            .unwrap();
        let after_two = store
            .complete_chat_turn(chat.id, "really?", "yes")
            .await
            .unwrap();
        assert_eq!(after_one.turn_index, 1);
        assert_eq!(after_two.turn_index, 2);
        assert_eq!(after_two.last_user_message.as_deref(), Some("really?"));
    }
}

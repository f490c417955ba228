//! crates/deliberation_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! core independent of the storage engine and the AI provider.

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    AiChat, AiConversationRating, Persona, PlatformFeedback, Response, ResponsePolicy, Session,
    Vote, VoteCategory,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations, following the engine's
/// error taxonomy: validation and not-found are recoverable client errors;
/// upstream and unexpected (storage) failures are surfaced generically and
/// never retried inside the core.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Upstream provider unavailable: {0}")]
    Upstream(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// An ordered, incremental sequence of AI response fragments.
pub type DeltaStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The durable store behind the response/vote/session/chat ledgers.
///
/// Responses and votes are append-only: implementations never mutate an
/// existing row of either ledger, which is what makes concurrent writers
/// safe without locking.
#[async_trait]
pub trait SurveyStore: Send + Sync {
    // --- Sessions ---
    async fn create_session(&self, survey_id: Uuid, locale: Option<&str>) -> PortResult<Session>;

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session>;

    /// Stamps `completed_at`; the only field of a session that ever changes.
    async fn complete_session(&self, session_id: Uuid) -> PortResult<()>;

    // --- Responses (append-only ledger) ---
    async fn insert_response(
        &self,
        question_id: Uuid,
        session_id: Uuid,
        value: Value,
        edited_from_id: Option<Uuid>,
    ) -> PortResult<Response>;

    async fn get_response(&self, response_id: Uuid) -> PortResult<Response>;

    /// All responses to one question selected by `policy`, newest first.
    async fn responses_for_question(
        &self,
        question_id: Uuid,
        policy: ResponsePolicy,
    ) -> PortResult<Vec<Response>>;

    /// All responses across a survey selected by `policy`, newest first.
    /// Survey membership is derived through the owning session.
    async fn responses_for_survey(
        &self,
        survey_id: Uuid,
        policy: ResponsePolicy,
    ) -> PortResult<Vec<Response>>;

    /// Every response id (edits included) authored by one session.
    async fn response_ids_for_session(&self, session_id: Uuid) -> PortResult<Vec<Uuid>>;

    // --- Votes (append-only ledger) ---
    async fn insert_vote(
        &self,
        target_response_id: Uuid,
        session_id: Uuid,
        category: VoteCategory,
        reason: Option<&str>,
    ) -> PortResult<Vote>;

    /// Ids of every response the given session has already voted on.
    async fn voted_response_ids(&self, session_id: Uuid) -> PortResult<Vec<Uuid>>;

    // --- AI chats ---
    async fn create_chat(
        &self,
        session_id: Uuid,
        persona: Persona,
        initial_context: &str,
        opening_line: &str,
    ) -> PortResult<AiChat>;

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<AiChat>;

    /// Commits one completed exchange: bumps the turn index by one and
    /// records the last user/AI messages. Called only on natural stream
    /// completion, never for a cancelled or failed turn.
    async fn complete_chat_turn(
        &self,
        chat_id: Uuid,
        user_message: &str,
        ai_response: &str,
    ) -> PortResult<AiChat>;

    // --- Platform feedback ---
    async fn insert_feedback(
        &self,
        session_id: Uuid,
        experience_rating: i32,
        ai_conversation_rating: Option<AiConversationRating>,
        suggestions: Option<&str>,
    ) -> PortResult<PlatformFeedback>;
}

/// The AI collaborator, polymorphic over a single capability: given a
/// message (plus persona and conversation context), produce an ordered
/// delta stream terminated by the stream's natural end. A real model
/// backend and a deterministic scripted backend are interchangeable.
#[async_trait]
pub trait DialogueService: Send + Sync {
    async fn generate(
        &self,
        persona: Persona,
        context: &str,
        message: &str,
    ) -> PortResult<DeltaStream>;
}

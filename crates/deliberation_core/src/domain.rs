//! crates/deliberation_core/src/domain.rs
//!
//! Defines the pure, core data structures for the deliberation engine.
//! These structs are independent of any database or transport format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One participant's identity for one survey run.
///
/// Created once at flow start and never deleted during a run; only
/// `completed_at` is ever written after creation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub survey_id: Uuid,
    /// Short human-shareable key, see [`new_session_key`].
    pub session_key: String,
    pub locale: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One recorded answer. Immutable once created; revisions are new rows.
///
/// A response with a non-null `edited_from_id` is an edit. Edits are never
/// counted in the opinion distribution and never offered for peer voting:
/// the system deliberately compares first-take opinions across the cohort.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: Uuid,
    pub question_id: Uuid,
    pub session_id: Uuid,
    /// Opaque answer payload; shape depends on the question type,
    /// e.g. `{"likert": 4, "justification": "..."}`.
    pub value: Value,
    pub edited_from_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Response {
    /// Whether this row is a revision of an earlier response.
    pub fn is_edit(&self) -> bool {
        self.edited_from_id.is_some()
    }
}

/// Generates a shareable session key: 8 uppercase hex characters taken
/// from a fresh v4 UUID. Every store hands out keys of this shape.
pub fn new_session_key() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

/// The fixed set of peer-evaluation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteCategory {
    Approve,
    Disapprove,
    Quality,
    Pass,
}

impl VoteCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteCategory::Approve => "approve",
            VoteCategory::Disapprove => "disapprove",
            VoteCategory::Quality => "quality",
            VoteCategory::Pass => "pass",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(VoteCategory::Approve),
            "disapprove" => Some(VoteCategory::Disapprove),
            "quality" => Some(VoteCategory::Quality),
            "pass" => Some(VoteCategory::Pass),
            _ => None,
        }
    }
}

/// One peer evaluation of a response. Append-only, never edited.
#[derive(Debug, Clone)]
pub struct Vote {
    pub id: Uuid,
    pub target_response_id: Uuid,
    /// The voting session, not the session that authored the target.
    pub session_id: Uuid,
    pub category: VoteCategory,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The AI interlocutor persona for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Socratic,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Socratic => "socratic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "socratic" => Some(Persona::Socratic),
            _ => None,
        }
    }

    /// The deterministic opening line committed when a conversation starts.
    /// Not generated per-call.
    pub fn opening_line(&self) -> &'static str {
        match self {
            Persona::Socratic => "Let's begin our conversation. What's on your mind?",
        }
    }
}

/// A turn-indexed conversation between a session and an AI persona.
#[derive(Debug, Clone)]
pub struct AiChat {
    pub id: Uuid,
    pub session_id: Uuid,
    pub persona: Persona,
    /// Increments by exactly one per completed exchange.
    pub turn_index: i32,
    pub last_user_message: Option<String>,
    pub last_ai_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// End-of-flow platform feedback. Submitting it completes the session.
#[derive(Debug, Clone)]
pub struct PlatformFeedback {
    pub id: Uuid,
    pub session_id: Uuid,
    /// 1..=5 star rating of the overall experience.
    pub experience_rating: i32,
    pub ai_conversation_rating: Option<AiConversationRating>,
    pub suggestions: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How the participant rated the AI conversation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiConversationRating {
    VeryHelpful,
    SomewhatHelpful,
    NotHelpful,
    Distracting,
}

impl AiConversationRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiConversationRating::VeryHelpful => "very_helpful",
            AiConversationRating::SomewhatHelpful => "somewhat_helpful",
            AiConversationRating::NotHelpful => "not_helpful",
            AiConversationRating::Distracting => "distracting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "very_helpful" => Some(AiConversationRating::VeryHelpful),
            "somewhat_helpful" => Some(AiConversationRating::SomewhatHelpful),
            "not_helpful" => Some(AiConversationRating::NotHelpful),
            "distracting" => Some(AiConversationRating::Distracting),
            _ => None,
        }
    }
}

/// Which responses a read path should see for a session/question.
///
/// The product aggregates and offers for voting only first-take answers
/// (`OriginalOnly`). `Latest` selects the leaf of each edit chain instead
/// and exists so alternative policies are additive, not a silent filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePolicy {
    OriginalOnly,
    Latest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_keys_are_eight_uppercase_hex_characters() {
        let key = new_session_key();
        assert_eq!(key.len(), 8);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}

//! services/api/src/web/relay.rs
//!
//! Manages conversational sessions and streams AI-generated turns to the
//! participant, independent of any one HTTP request's lifetime.
//!
//! Per conversation the states are Created -> Streaming -> Idle (repeating
//! Streaming per user turn). Streaming is tracked in an in-process registry
//! so a conversation handles exactly one turn at a time; the registry entry
//! is released by a drop guard, which also covers the consumer vanishing
//! mid-stream.

use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use deliberation_core::domain::{AiChat, Persona};
use deliberation_core::ports::{DialogueService, PortError, PortResult, SurveyStore};

use crate::web::protocol::{CompletionReason, TurnEvent};

/// The ordered event stream of one chat turn.
pub type TurnStream = Pin<Box<dyn Stream<Item = TurnEvent> + Send>>;

/// The conversational session manager.
#[derive(Clone)]
pub struct ChatStreamRelay {
    store: Arc<dyn SurveyStore>,
    dialogue: Arc<dyn DialogueService>,
    /// Conversations with a turn currently in flight.
    streaming: Arc<Mutex<HashSet<Uuid>>>,
}

/// Releases the streaming claim when the turn ends for any reason,
/// including the consumer dropping the stream mid-turn.
struct TurnGuard {
    chat_id: Uuid,
    streaming: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.streaming.lock().unwrap().remove(&self.chat_id);
    }
}

impl ChatStreamRelay {
    pub fn new(store: Arc<dyn SurveyStore>, dialogue: Arc<dyn DialogueService>) -> Self {
        Self {
            store,
            dialogue,
            streaming: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Creates a conversation for the session with turn index 0 and the
    /// persona's deterministic opening line. The record is committed before
    /// any streaming begins.
    pub async fn start(&self, session_id: Uuid, initial_context: &str) -> PortResult<AiChat> {
        // The session must exist; conversations are keyed to it.
        self.store.get_session(session_id).await?;

        let persona = Persona::Socratic;
        let chat = self
            .store
            .create_chat(session_id, persona, initial_context, persona.opening_line())
            .await?;
        info!("Started chat {} for session {}", chat.id, session_id);
        Ok(chat)
    }

    /// Whether a turn is currently in flight for the conversation.
    pub fn is_streaming(&self, chat_id: Uuid) -> bool {
        self.streaming.lock().unwrap().contains(&chat_id)
    }

    /// Asks the AI collaborator for a reply to `user_message` and returns
    /// the ordered delta stream, terminated by exactly one
    /// `TurnEvent::Complete`.
    ///
    /// The stream is pull-based: if the consumer disconnects, no further
    /// fragments are produced and the conversation record is left exactly
    /// as it was before the turn. Only natural completion commits the turn
    /// (index +1, last messages recorded).
    pub async fn send_turn(&self, chat_id: Uuid, user_message: String) -> PortResult<TurnStream> {
        let chat = self.store.get_chat(chat_id).await?;

        {
            let mut streaming = self.streaming.lock().unwrap();
            if !streaming.insert(chat_id) {
                return Err(PortError::Validation(format!(
                    "Chat {} is already streaming a turn",
                    chat_id
                )));
            }
        }
        let guard = TurnGuard {
            chat_id,
            streaming: self.streaming.clone(),
        };

        let store = self.store.clone();
        let dialogue = self.dialogue.clone();
        let context = turn_context(&chat);

        let stream = async_stream::stream! {
            let _guard = guard;

            let deltas = match dialogue.generate(chat.persona, &context, &user_message).await {
                Ok(deltas) => deltas,
                Err(e) => {
                    warn!("Dialogue provider refused chat {}: {}", chat_id, e);
                    yield TurnEvent::Complete { reason: CompletionReason::UpstreamUnavailable };
                    return;
                }
            };
            futures::pin_mut!(deltas);

            let mut full_response = String::new();
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(text) => {
                        full_response.push_str(&text);
                        yield TurnEvent::Delta(text);
                    }
                    Err(e) => {
                        // Terminate rather than leave the stream hanging.
                        warn!("Dialogue provider failed mid-stream for chat {}: {}", chat_id, e);
                        yield TurnEvent::Complete { reason: CompletionReason::UpstreamUnavailable };
                        return;
                    }
                }
            }

            match store.complete_chat_turn(chat_id, &user_message, &full_response).await {
                Ok(chat) => {
                    info!("Chat {} completed turn {}", chat_id, chat.turn_index);
                    yield TurnEvent::Complete { reason: CompletionReason::Stop };
                }
                Err(e) => {
                    error!("Failed to commit turn for chat {}: {}", chat_id, e);
                    yield TurnEvent::Complete { reason: CompletionReason::Error };
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Builds the provider context from the conversation record: the previous
/// exchange, which for a fresh chat is the participant's initial context
/// and the opening line.
fn turn_context(chat: &AiChat) -> String {
    match (&chat.last_user_message, &chat.last_ai_response) {
        (Some(user), Some(ai)) => format!("PREVIOUS EXCHANGE:\nParticipant: {}\nYou: {}", user, ai),
        (Some(user), None) => format!("PREVIOUS EXCHANGE:\nParticipant: {}", user),
        _ => String::new(),
    }
}

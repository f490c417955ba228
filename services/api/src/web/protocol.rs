//! services/api/src/web/protocol.rs
//!
//! Wire formats for the real-time surfaces: the WebSocket fan-out of
//! aggregate updates and the server-sent chat turn stream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

//=========================================================================================
// Events Fanned Out Over the WebSocket Channel
//=========================================================================================

/// Events published process-wide and delivered to every connected listener.
/// Listeners filter by `questionId` themselves; the broadcaster does not.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    /// A question's opinion distribution changed. Carries the full updated
    /// snapshot, not a diff.
    #[serde(rename_all = "camelCase")]
    DistributionUpdate {
        question_id: Uuid,
        distribution: BTreeMap<String, u64>,
    },
}

//=========================================================================================
// Chat Turn Stream Events (SSE)
//=========================================================================================

/// Why a chat turn stream terminated.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The reply finished naturally and the turn was committed.
    Stop,
    /// The AI collaborator failed before or during generation; the turn was
    /// not committed.
    UpstreamUnavailable,
    /// The terminal store write failed after a fully generated reply.
    Error,
}

/// One element of a chat turn stream: ordered text fragments followed by
/// exactly one terminal completion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Delta(String),
    Complete { reason: CompletionReason },
}

/// Body of a `data:` line for a delta fragment.
#[derive(Serialize, Deserialize, Debug)]
pub struct DeltaPayload {
    pub delta: String,
}

/// Body of the `message_complete` event's `data:` line.
#[derive(Serialize, Deserialize, Debug)]
pub struct CompletionPayload {
    pub reason: CompletionReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_update_wire_shape_matches_clients() {
        let event = BroadcastEvent::DistributionUpdate {
            question_id: Uuid::nil(),
            distribution: BTreeMap::from([("1".to_string(), 2)]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "distribution_update");
        assert_eq!(json["questionId"], Uuid::nil().to_string());
        assert_eq!(json["distribution"]["1"], 2);
    }

    #[test]
    fn completion_reasons_serialize_snake_case() {
        let payload = CompletionPayload {
            reason: CompletionReason::Stop,
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"reason":"stop"}"#
        );
    }
}

//! services/api/src/web/mod.rs
//!
//! The HTTP, WebSocket and SSE surface of the service.

pub mod broadcast;
pub mod protocol;
pub mod relay;
pub mod rest;
pub mod state;
pub mod ws_handler;

pub use broadcast::EventBroadcaster;
pub use protocol::{BroadcastEvent, CompletionReason, TurnEvent};
pub use relay::ChatStreamRelay;
pub use rest::{routes, ApiDoc};
pub use state::AppState;

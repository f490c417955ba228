//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use deliberation_core::ports::{DialogueService, SurveyStore};

use crate::config::Config;
use crate::web::broadcast::EventBroadcaster;
use crate::web::relay::ChatStreamRelay;

/// The shared application state, created once at startup and passed to all
/// handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SurveyStore>,
    pub relay: ChatStreamRelay,
    pub broadcaster: EventBroadcaster,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SurveyStore>,
        dialogue: Arc<dyn DialogueService>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            relay: ChatStreamRelay::new(store.clone(), dialogue),
            broadcaster: EventBroadcaster::new(config.broadcast_capacity),
            store,
            config,
        }
    }
}

pub mod aggregate;
pub mod domain;
pub mod memory;
pub mod ports;
pub mod queue;
pub mod responses;

pub use domain::{
    new_session_key, AiChat, AiConversationRating, Persona, PlatformFeedback, Response,
    ResponsePolicy, Session, Vote, VoteCategory,
};
pub use ports::{DeltaStream, DialogueService, PortError, PortResult, SurveyStore};
pub use queue::{VoteCandidate, DEFAULT_BATCH_LIMIT};

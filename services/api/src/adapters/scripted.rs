//! services/api/src/adapters/scripted.rs
//!
//! A deterministic `DialogueService` with fixed text chunks emitted on timer
//! ticks. It backs the test suite and any deployment without an AI provider
//! configured; the relay cannot tell it apart from the real adapter.

use async_trait::async_trait;
use std::time::Duration;

use deliberation_core::domain::Persona;
use deliberation_core::ports::{DeltaStream, DialogueService, PortResult};

const SCRIPTED_CHUNKS: &[&str] = &[
    "That's ", "an ", "interesting ", "point. ", "Have ", "you ", "considered ", "the ",
    "economic ", "implications ", "of ", "that ", "perspective? ", "For ", "example, ", "how ",
    "might ", "it ", "affect ", "jobs ", "in ", "traditional ", "industries?",
];

/// Emits a canned reply one fragment at a time, regardless of persona,
/// context, or message.
pub struct ScriptedDialogueAdapter {
    chunks: Vec<String>,
    delay: Duration,
}

impl ScriptedDialogueAdapter {
    /// The canned reply with the production pacing of one fragment every
    /// 50 milliseconds.
    pub fn new() -> Self {
        Self::with_script(
            SCRIPTED_CHUNKS.iter().map(|s| s.to_string()).collect(),
            Duration::from_millis(50),
        )
    }

    /// A custom script; tests pass `Duration::ZERO` to skip the pacing.
    pub fn with_script(chunks: Vec<String>, delay: Duration) -> Self {
        Self { chunks, delay }
    }
}

impl Default for ScriptedDialogueAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DialogueService for ScriptedDialogueAdapter {
    async fn generate(
        &self,
        _persona: Persona,
        _context: &str,
        _message: &str,
    ) -> PortResult<DeltaStream> {
        let chunks = self.chunks.clone();
        let delay = self.delay;
        let stream = async_stream::stream! {
            for chunk in chunks {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(chunk);
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn emits_the_script_in_order() {
        let adapter = ScriptedDialogueAdapter::with_script(
            vec!["a".into(), "b".into(), "c".into()],
            Duration::ZERO,
        );
        let stream = adapter
            .generate(Persona::Socratic, "", "hello")
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }
}

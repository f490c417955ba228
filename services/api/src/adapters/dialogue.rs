//! services/api/src/adapters/dialogue.rs
//!
//! The adapter for the AI interlocutor. It implements the `DialogueService`
//! port against an OpenAI-compatible chat-completion API, streaming the
//! reply as an ordered sequence of text deltas.

const SOCRATIC_INSTRUCTIONS: &str = r#"You are a thoughtful deliberation partner in an opinion survey.

The participant has just recorded an opinion on a civic or policy question and is now
reflecting on it with you. The CONVERSATION CONTEXT you receive may include their
recorded opinion and the previous exchange of this conversation.

Your role:
- Probe the participant's reasoning in a Socratic way: ask about assumptions,
  trade-offs, and who might be affected differently.
- Never tell the participant what to think or which answer is correct.
- Raise at most one counterpoint or question per reply.
- Keep replies conversational and short: two to four sentences.
- If the participant changes their mind, ask what moved them rather than approving
  or disapproving."#;

const USER_INPUT_TEMPLATE: &str = r#"CONVERSATION CONTEXT:
---
{context}
---

PARTICIPANT MESSAGE:
{message}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;

use deliberation_core::domain::Persona;
use deliberation_core::ports::{DeltaStream, DialogueService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `DialogueService` using an OpenAI-compatible
/// LLM with streamed chat completions.
#[derive(Clone)]
pub struct OpenAiDialogueAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiDialogueAdapter {
    /// Creates a new `OpenAiDialogueAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn instructions(persona: Persona) -> &'static str {
        match persona {
            Persona::Socratic => SOCRATIC_INSTRUCTIONS,
        }
    }
}

//=========================================================================================
// `DialogueService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DialogueService for OpenAiDialogueAdapter {
    /// Asks the model for a reply and returns the fragments as they arrive.
    /// Provider errors surface as `PortError::Upstream`, both before the
    /// stream opens and mid-stream.
    async fn generate(
        &self,
        persona: Persona,
        context: &str,
        message: &str,
    ) -> PortResult<DeltaStream> {
        let user_input = USER_INPUT_TEMPLATE
            .replace("{context}", context)
            .replace("{message}", message);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(Self::instructions(persona))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_input)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e: OpenAIError| PortError::Upstream(e.to_string()))?;

        let deltas = stream
            .map(|chunk| match chunk {
                Ok(response) => Ok(response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .unwrap_or_default()),
                Err(e) => Err(PortError::Upstream(e.to_string())),
            })
            // Role-only and finish chunks carry no text.
            .filter(|delta| futures::future::ready(!matches!(delta, Ok(d) if d.is_empty())));

        Ok(Box::pin(deltas))
    }
}

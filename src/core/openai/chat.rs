use serde::{Deserialize, Serialize};

use super::client::{OpenAIClient, send_json};
use super::error::{OpenAIError, OpenAIResult};

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIClient {
    /// Run a chat completion and return the first choice's text.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> OpenAIResult<String> {
        tracing::debug!(model, turns = messages.len(), "Requesting chat completion");

        let request = self
            .post("chat/completions")
            .json(&CompletionRequest { model, messages });

        let response: CompletionResponse = send_json(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| OpenAIError::InvalidResponse("completion has no choices".to_string()))
    }
}

//! Assistants API relay.
//!
//! `process_message` runs a one-shot conversation: create a thread, add the
//! user message, start a run, poll the run until it completes, then return
//! the last assistant text block.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::client::{ASSISTANTS_BETA_HEADER, OpenAIClient, send_json};
use super::error::{OpenAIError, OpenAIResult};
use crate::config::DEFAULT_CHAT_MODEL;

/// Reply when the run completed without an assistant message.
pub const NO_RESPONSE: &str = "No response";

/// Reply when the last assistant message does not start with a text block.
pub const UNSUPPORTED_RESPONSE: &str = "Unsupported response type";

/// Tool attached to an assistant (`code_interpreter`, `file_search`/`retrieval`, `function`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<Value>,
}

/// Create/update body. Absent fields are left out of the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<AssistantTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// Assistant as returned by the provider; extra fields pass through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Run polling cadence.
#[derive(Debug, Clone, Copy)]
pub struct RunPolling {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for RunPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_polls: 300,
        }
    }
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct Run {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<TextBlock>,
}

#[derive(Deserialize)]
struct TextBlock {
    value: String,
}

impl OpenAIClient {
    pub async fn create_assistant(&self, mut request: AssistantRequest) -> OpenAIResult<Assistant> {
        if request.model.is_none() {
            request.model = Some(DEFAULT_CHAT_MODEL.to_string());
        }

        let builder = self
            .post("assistants")
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .json(&request);

        let assistant: Assistant = send_json(builder).await?;
        tracing::info!(assistant_id = %assistant.id, "Assistant created");
        Ok(assistant)
    }

    pub async fn update_assistant(
        &self,
        assistant_id: &str,
        request: &AssistantRequest,
    ) -> OpenAIResult<Assistant> {
        let builder = self
            .post(&format!("assistants/{assistant_id}"))
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .json(request);

        let assistant: Assistant = send_json(builder).await?;
        tracing::info!(assistant_id = %assistant.id, "Assistant updated");
        Ok(assistant)
    }

    /// Send one user message to an assistant and wait for its reply text.
    pub async fn process_message(
        &self,
        assistant_id: &str,
        content: &str,
        polling: RunPolling,
    ) -> OpenAIResult<String> {
        let thread: IdOnly = send_json(
            self.post("threads")
                .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
                .json(&serde_json::json!({})),
        )
        .await?;

        let _: Value = send_json(
            self.post(&format!("threads/{}/messages", thread.id))
                .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
                .json(&serde_json::json!({"role": "user", "content": content})),
        )
        .await?;

        let mut run: Run = send_json(
            self.post(&format!("threads/{}/runs", thread.id))
                .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
                .json(&serde_json::json!({"assistant_id": assistant_id})),
        )
        .await?;

        tracing::debug!(thread_id = %thread.id, run_id = %run.id, "Assistant run started");

        let mut polls = 0;
        while run.status != "completed" {
            if matches!(run.status.as_str(), "failed" | "cancelled" | "expired") {
                return Err(OpenAIError::RunFailed {
                    run_id: run.id,
                    status: run.status,
                });
            }
            if polls >= polling.max_polls {
                return Err(OpenAIError::RunTimeout(run.id));
            }

            tokio::time::sleep(polling.interval).await;
            polls += 1;

            run = send_json(
                self.get(&format!("threads/{}/runs/{}", thread.id, run.id))
                    .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1),
            )
            .await?;
        }

        let messages: MessageList = send_json(
            self.get(&format!("threads/{}/messages", thread.id))
                .query(&[("order", "asc")])
                .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1),
        )
        .await?;

        Ok(last_assistant_text(messages))
    }
}

fn last_assistant_text(messages: MessageList) -> String {
    let Some(last) = messages
        .data
        .into_iter()
        .rev()
        .find(|m| m.role == "assistant")
    else {
        return NO_RESPONSE.to_string();
    };

    match last.content.into_iter().next() {
        None => NO_RESPONSE.to_string(),
        Some(block) if block.block_type == "text" => block
            .text
            .map(|t| t.value)
            .unwrap_or_else(|| UNSUPPORTED_RESPONSE.to_string()),
        Some(_) => UNSUPPORTED_RESPONSE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list(value: Value) -> MessageList {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_last_assistant_text_picks_latest_assistant() {
        let messages = list(json!({"data": [
            {"role": "user", "content": [{"type": "text", "text": {"value": "hi"}}]},
            {"role": "assistant", "content": [{"type": "text", "text": {"value": "first"}}]},
            {"role": "assistant", "content": [{"type": "text", "text": {"value": "second"}}]}
        ]}));
        assert_eq!(last_assistant_text(messages), "second");
    }

    #[test]
    fn test_last_assistant_text_fallbacks() {
        let no_assistant = list(json!({"data": [{"role": "user", "content": []}]}));
        assert_eq!(last_assistant_text(no_assistant), NO_RESPONSE);

        let empty_content = list(json!({"data": [{"role": "assistant", "content": []}]}));
        assert_eq!(last_assistant_text(empty_content), NO_RESPONSE);

        let image = list(json!({"data": [
            {"role": "assistant", "content": [{"type": "image_file"}]}
        ]}));
        assert_eq!(last_assistant_text(image), UNSUPPORTED_RESPONSE);
    }

    #[test]
    fn test_assistant_request_skips_absent_fields() {
        let body = serde_json::to_value(AssistantRequest {
            name: Some("Support".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({"name": "Support", "tools": []}));
    }
}

//! Chat-protocol client (OpenAI-style `/v1/chat/completions`)

use accueil_core::config::ChatProtocolConfig;
use accueil_core::session::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::base::{BackendError, BackendResult, HttpTransport, ResponseBackend};

/// Chat API request format
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Chat API response format; only the fields we read
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Backend speaking the chat protocol
pub struct ChatProtocolClient {
    transport: HttpTransport,
    model: String,
}

impl ChatProtocolClient {
    /// Create a new chat-protocol client
    pub fn new(config: &ChatProtocolConfig) -> accueil_core::Result<Self> {
        let transport = HttpTransport::new(
            &config.endpoint,
            &config.path,
            &config.headers,
            Duration::from_millis(config.timeout_ms),
        )?;
        Ok(Self {
            transport,
            model: config.model.clone(),
        })
    }

    /// Optional leading system entry, then the history in order
    fn build_messages<'a>(system_prompt: &'a str, history: &'a [Message]) -> Vec<WireMessage<'a>> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system_prompt.trim().is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.extend(history.iter().map(|msg| WireMessage {
            role: msg.role.as_str(),
            content: &msg.content,
        }));
        messages
    }

    fn parse_response(raw: &str) -> BackendResult<String> {
        let response: ChatCompletionResponse = serde_json::from_str(raw)
            .map_err(|e| BackendError::MalformedResponse(format!("invalid chat JSON: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| {
                BackendError::MalformedResponse(
                    "missing choices[0].message.content".to_string(),
                )
            })
    }
}

#[async_trait]
impl ResponseBackend for ChatProtocolClient {
    async fn generate(&self, system_prompt: &str, history: &[Message]) -> BackendResult<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: Self::build_messages(system_prompt, history),
        };

        debug!(
            "Sending chat request to {} with model {} ({} messages)",
            self.transport.url(),
            self.model,
            request.messages.len()
        );

        let raw = self.transport.post_json(&request).await?;
        Self::parse_response(&raw)
    }

    fn describe(&self) -> String {
        format!("chat-protocol {} (model '{}')", self.transport.url(), self.model)
    }
}

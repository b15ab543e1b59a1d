//! Completion-protocol client (text-generation-inference `/generate`)
//!
//! The conversation is flattened into a single role-prefixed prompt and the
//! service answers with one `generated_text`, either bare or inside a
//! one-element batch.

use accueil_core::config::CompletionProtocolConfig;
use accueil_core::session::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::base::{BackendError, BackendResult, HttpTransport, ResponseBackend};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    inputs: String,
    parameters: GenerateParameters,
}

#[derive(Debug, Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    #[serde(default)]
    generated_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerateResponse {
    Batch(Vec<GeneratedText>),
    Single(GeneratedText),
}

/// Flatten a system prompt and history into one completion prompt.
///
/// Each part sits on its own line as `Role: text` with the text trimmed; a
/// trailing `Assistant:` line cues the model to answer.
pub fn flatten_prompt(system_prompt: &str, history: &[Message]) -> String {
    let mut parts = Vec::with_capacity(history.len() + 2);
    if !system_prompt.trim().is_empty() {
        parts.push(format!("System: {}", system_prompt.trim()));
    }
    for msg in history {
        parts.push(format!("{}: {}", msg.role.capitalized(), msg.content.trim()));
    }
    parts.push("Assistant:".to_string());
    parts.join("\n")
}

/// Backend speaking the single-prompt completion protocol
pub struct CompletionProtocolClient {
    transport: HttpTransport,
    model: String,
    max_new_tokens: u32,
    temperature: f32,
}

impl CompletionProtocolClient {
    pub fn new(config: &CompletionProtocolConfig) -> accueil_core::Result<Self> {
        let transport = HttpTransport::new(
            &config.endpoint,
            &config.path,
            &config.headers,
            Duration::from_millis(config.timeout_ms),
        )?;
        Ok(Self {
            transport,
            model: config.model.clone(),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
        })
    }

    fn parse_response(raw: &str) -> BackendResult<String> {
        let response: GenerateResponse = serde_json::from_str(raw).map_err(|e| {
            BackendError::MalformedResponse(format!("invalid completion JSON: {}", e))
        })?;

        let item = match response {
            GenerateResponse::Single(item) => Some(item),
            GenerateResponse::Batch(items) => items.into_iter().next(),
        };

        item.and_then(|item| item.generated_text)
            .ok_or_else(|| BackendError::MalformedResponse("missing generated_text".to_string()))
    }
}

#[async_trait]
impl ResponseBackend for CompletionProtocolClient {
    async fn generate(&self, system_prompt: &str, history: &[Message]) -> BackendResult<String> {
        let request = GenerateRequest {
            model: Some(self.model.as_str()).filter(|m| !m.is_empty()),
            inputs: flatten_prompt(system_prompt, history),
            parameters: GenerateParameters {
                max_new_tokens: self.max_new_tokens,
                temperature: self.temperature,
            },
        };

        debug!(
            "Sending completion request to {} ({} prompt chars)",
            self.transport.url(),
            request.inputs.chars().count()
        );

        let raw = self.transport.post_json(&request).await?;
        Self::parse_response(&raw)
    }

    fn describe(&self) -> String {
        if self.model.is_empty() {
            format!("completion-protocol {}", self.transport.url())
        } else {
            format!(
                "completion-protocol {} (model '{}')",
                self.transport.url(),
                self.model
            )
        }
    }
}

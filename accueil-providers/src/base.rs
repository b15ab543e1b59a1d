//! Base trait for generation backends

use accueil_core::session::Message;
use accueil_core::utils::truncate;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Longest error body kept in an `HttpStatus` error
const ERROR_BODY_PREVIEW: usize = 200;

/// Classified failure of one backend call.
///
/// Transport-level errors never leave a backend unclassified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend timed out after {0} ms")]
    Timeout(u64),

    #[error("backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("backend unreachable: {0}")]
    Transport(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A remote generative-text service.
///
/// Implementations hide the wire dialect: callers only see a system prompt
/// and a conversation history going in, and the reply text coming out.
#[async_trait]
pub trait ResponseBackend: Send + Sync {
    /// Generate the assistant's next reply
    async fn generate(&self, system_prompt: &str, history: &[Message]) -> BackendResult<String>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// One configured POST target with a bounded request time.
pub(crate) struct HttpTransport {
    client: Client,
    url: String,
    timeout_ms: u64,
}

impl HttpTransport {
    pub(crate) fn new(
        endpoint: &str,
        path: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> accueil_core::Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                accueil_core::Error::Config(format!("invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                accueil_core::Error::Config(format!("invalid value for header '{}': {}", name, e))
            })?;
            default_headers.insert(name, value);
        }

        // The client-level timeout covers connect, send and body read; when
        // it fires the request future is dropped and the connection released.
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| accueil_core::Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: join_url(endpoint, path),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// POST a JSON body and return the raw response text of a 2xx reply
    pub(crate) async fn post_json<B: Serialize + ?Sized>(&self, body: &B) -> BackendResult<String> {
        debug!("POST {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_PREVIEW),
            });
        }

        response.text().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout_ms)
        } else if err.is_decode() {
            BackendError::MalformedResponse(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

fn join_url(endpoint: &str, path: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

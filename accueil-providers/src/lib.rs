//! Generation backend integrations for accueil
//!
//! This crate provides the `ResponseBackend` abstraction and its two wire
//! dialects: the chat protocol and the single-prompt completion protocol.

pub mod base;
pub mod chat;
pub mod completion;

pub use base::{BackendError, BackendResult, ResponseBackend};
pub use chat::ChatProtocolClient;
pub use completion::{flatten_prompt, CompletionProtocolClient};

use accueil_core::config::BackendConfig;
use std::sync::Arc;
use tracing::info;

/// Build the backend client selected by configuration
pub fn build_backend(config: &BackendConfig) -> accueil_core::Result<Arc<dyn ResponseBackend>> {
    let backend: Arc<dyn ResponseBackend> = match config {
        BackendConfig::ChatProtocol(cfg) => Arc::new(ChatProtocolClient::new(cfg)?),
        BackendConfig::CompletionProtocol(cfg) => Arc::new(CompletionProtocolClient::new(cfg)?),
    };
    info!("Using generation backend: {}", backend.describe());
    Ok(backend)
}

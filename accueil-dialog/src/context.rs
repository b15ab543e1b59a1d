//! Context builder for backend requests

use accueil_core::config::DialogConfig;
use accueil_core::session::{Message, Role};

/// Assembles what is sent to the backend for one turn
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn from_config(config: &DialogConfig) -> Self {
        Self::new(config.system_prompt.clone())
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Conversation part of the request: user and assistant messages in order.
    ///
    /// System entries stored in a session are left out; the configured
    /// prompt is the only system instruction a backend sees.
    pub fn build_history(&self, history: Vec<Message>) -> Vec<Message> {
        history
            .into_iter()
            .filter(|msg| msg.role != Role::System)
            .collect()
    }
}

use accueil_core::session::{SessionId, SessionStore};
use accueil_core::Entities;
use accueil_dialog::{DialogOrchestrator, TurnActions, TurnOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DialogOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<DialogOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.orchestrator.sessions()
    }
}

/// Body of `POST /v1/respond`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondRequest {
    pub session_id: Option<SessionId>,
    pub intent: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub raw_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondResponse {
    pub text: String,
    pub actions: TurnActions,
    pub session_id: SessionId,
    pub outcome: TurnOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
}

use accueil_core::session::Session;
use accueil_core::Error;
use accueil_dialog::TurnRequest;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::state::{
    AppState, HealthResponse, ResetResponse, RespondRequest, RespondResponse, SessionCreated,
};

type ApiError = (StatusCode, Json<Value>);

fn not_found(detail: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": detail })))
}

pub async fn respond_handler(
    State(state): State<AppState>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, ApiError> {
    let session_id = match payload.session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => state.sessions().create(),
    };

    let request = TurnRequest {
        session_id: session_id.clone(),
        intent: payload.intent,
        confidence: payload.confidence,
        entities: payload.entities,
        raw_text: payload.raw_text,
    };

    match state.orchestrator.handle(request).await {
        Ok(reply) => Ok(Json(RespondResponse {
            text: reply.text,
            actions: reply.actions,
            session_id,
            outcome: reply.outcome,
        })),
        Err(Error::UnknownSession(id)) => {
            tracing::info!("Rejected turn for unknown session {}", id);
            Err(not_found("session not found"))
        }
        Err(e) => {
            tracing::error!("Turn failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": e.to_string() })),
            ))
        }
    }
}

pub async fn create_session_handler(State(state): State<AppState>) -> Json<SessionCreated> {
    Json(SessionCreated {
        session_id: state.sessions().create(),
    })
}

pub async fn get_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .sessions()
        .peek(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("session not found"))
}

pub async fn reset_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ResetResponse>, ApiError> {
    if state.sessions().reset(&session_id).await {
        Ok(Json(ResetResponse {
            status: "ok".to_string(),
            session_id,
        }))
    } else {
        Err(not_found("session not found"))
    }
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.sessions().len(),
    })
}

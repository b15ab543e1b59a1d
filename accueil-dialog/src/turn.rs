//! Turn input, reply and side-effect action types

use accueil_core::session::SessionId;
use accueil_core::Entities;
use serde::{Deserialize, Serialize};

/// Intent whose successful turns may produce a booking action
pub const BOOK_ACTIVITY_INTENT: &str = "book_activity";

/// One classified utterance to answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: SessionId,
    pub intent: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub raw_text: String,
}

impl TurnRequest {
    pub fn new(session_id: impl Into<SessionId>, intent: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            intent: intent.into(),
            confidence: 0.0,
            entities: Entities::new(),
            raw_text: String::new(),
        }
    }

    pub fn with_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = raw_text.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_entity(
        mut self,
        name: impl Into<String>,
        value: impl Into<accueil_core::EntityValue>,
    ) -> Self {
        self.entities.insert(name.into(), value.into());
        self
    }
}

/// Which terminal path a turn took
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The backend produced the reply
    Generated,
    /// A fallback template for the intent was used
    Fallback,
    /// The generic apology was used
    Apology,
}

impl TurnOutcome {
    pub fn fell_back(&self) -> bool {
        !matches!(self, Self::Generated)
    }
}

/// Reservation request derived from a successful booking turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub activity: String,
    pub time: String,
}

/// Side effects for downstream systems; `{}` when there are none
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
}

impl TurnActions {
    pub fn is_empty(&self) -> bool {
        self.booking.is_none()
    }

    /// Booking action for `intent`, present only when both slots are usable
    pub fn derive(intent: &str, entities: &Entities) -> Self {
        if intent != BOOK_ACTIVITY_INTENT {
            return Self::default();
        }
        let slot = |name: &str| {
            entities
                .get(name)
                .and_then(|value| value.first_non_blank())
                .map(str::to_string)
        };
        let booking = match (slot("activity"), slot("time")) {
            (Some(activity), Some(time)) => Some(Booking { activity, time }),
            _ => None,
        };
        Self { booking }
    }
}

/// Final answer of a turn; `text` is never empty
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnReply {
    pub text: String,
    pub actions: TurnActions,
    pub outcome: TurnOutcome,
}

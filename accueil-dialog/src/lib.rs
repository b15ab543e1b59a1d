//! Dialog logic for accueil
//!
//! This crate turns a classified utterance into a reply: it drives the
//! generation backend, falls back to static templates when the backend is
//! unusable, and derives side-effect actions for downstream systems.

pub mod context;
pub mod fallback;
pub mod orchestrator;
pub mod turn;

pub use context::ContextBuilder;
pub use fallback::{render_template, FallbackPolicy, TemplateRenderError};
pub use orchestrator::DialogOrchestrator;
pub use turn::{Booking, TurnActions, TurnOutcome, TurnReply, TurnRequest, BOOK_ACTIVITY_INTENT};

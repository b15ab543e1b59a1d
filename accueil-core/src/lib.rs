//! Core types and services for accueil
//!
//! This crate provides the configuration layer, logging setup, classifier
//! entity types and the TTL-bounded session store shared by the other
//! accueil components.

pub mod config;
pub mod entities;
pub mod error;
pub mod logging;
pub mod session;
pub mod utils;

pub use entities::{Entities, EntityValue};
pub use error::{Error, Result};

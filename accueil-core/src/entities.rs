//! Entities extracted by the intent classifier

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One extracted slot: either a single value or a list of values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum EntityValue {
    Text(String),
    List(Vec<String>),
}

impl EntityValue {
    /// Text used when substituting the entity into a template
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::List(items) => items.join(", "),
        }
    }

    /// First usable value; blank strings and empty lists yield `None`
    pub fn first_non_blank(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()).filter(|t| !t.trim().is_empty()),
            Self::List(items) => items
                .iter()
                .map(String::as_str)
                .find(|item| !item.trim().is_empty()),
        }
    }
}

impl From<&str> for EntityValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EntityValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for EntityValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Slot name to value, as delivered by the classifier
pub type Entities = HashMap<String, EntityValue>;

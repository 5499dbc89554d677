//! Replies to confirm and prompt frames.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Answer to a `callConfirm` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthResponse {
    pub id: String,
    pub accept: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl AuthResponse {
    pub fn accept(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            accept: true,
            message: String::new(),
        }
    }

    pub fn deny(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            accept: false,
            message: message.into(),
        }
    }
}

/// Answer to a prompt frame: field name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptResponse {
    pub id: String,
    pub responses: HashMap<String, String>,
}

impl PromptResponse {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            responses: HashMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.responses.insert(field.into(), value.into());
        self
    }
}

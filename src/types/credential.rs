//! Stored credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum CredentialType {
    #[default]
    Tool,
    ModelProvider,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Credential {
    pub context: String,
    pub tool_name: String,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub env: HashMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: String,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Body of the `credentials*` requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CredentialRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub all_contexts: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// Which contexts `list_credentials` searches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListCredentialsOptions {
    pub credential_contexts: Vec<String>,
    pub all_contexts: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credential_type_uses_camel_case() {
        let cred: Credential = serde_json::from_value(json!({
            "context": "default",
            "toolName": "openai",
            "type": "modelProvider",
            "env": {"OPENAI_API_KEY": "sk"},
            "expiresAt": null
        }))
        .unwrap();
        assert_eq!(cred.credential_type, CredentialType::ModelProvider);
        assert!(!cred.is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        let cred = Credential {
            expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            ..Default::default()
        };
        assert!(cred.is_expired());
    }
}

//! Credential store operations.

use super::Gptscript;
use crate::error::Result;
use crate::types::credential::CredentialRequest;
use crate::types::{Credential, ListCredentialsOptions};

const DEFAULT_CONTEXT: &str = "default";

impl Gptscript {
    /// List credentials in the given contexts (`default` if none are named).
    pub async fn list_credentials(&self, options: ListCredentialsOptions) -> Result<Vec<Credential>> {
        let mut request = CredentialRequest::default();
        if options.all_contexts {
            request.all_contexts = true;
        } else if !options.credential_contexts.is_empty() {
            request.context = options.credential_contexts;
        } else {
            request.context = vec![DEFAULT_CONTEXT.to_string()];
        }

        let out = self.basic("credentials", &request).await?;
        Ok(serde_json::from_str(&out)?)
    }

    pub async fn create_credential(&self, credential: &Credential) -> Result<()> {
        let request = CredentialRequest {
            content: serde_json::to_string(credential)?,
            ..Default::default()
        };
        self.basic("credentials/create", &request).await.map(drop)
    }

    /// Fetch a credential with its secret values.
    pub async fn reveal_credential(&self, contexts: &[String], name: &str) -> Result<Credential> {
        let request = CredentialRequest {
            context: contexts.to_vec(),
            name: name.to_string(),
            ..Default::default()
        };
        let out = self.basic("credentials/reveal", &request).await?;
        Ok(serde_json::from_str(&out)?)
    }

    /// Delete a credential from a single context.
    pub async fn delete_credential(&self, context: &str, name: &str) -> Result<()> {
        let request = CredentialRequest {
            context: vec![context.to_string()],
            name: name.to_string(),
            ..Default::default()
        };
        self.basic("credentials/delete", &request).await.map(drop)
    }
}

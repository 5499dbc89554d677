//! Workspace file operations.
//!
//! File contents travel base64 encoded. The workspace ID falls back to the
//! handle's default (`GPTSCRIPT_WORKSPACE_ID`) when not given.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};

use super::Gptscript;
use crate::error::{GptscriptError, Result, WorkspaceConflict};
use crate::types::{FileInfo, PrefixOptions, RevisionInfo, WriteFileOptions};

/// Map an engine "not found: <id>/<path>" failure to a typed error.
fn not_found_in_workspace(
    err: GptscriptError,
    workspace_id: &str,
    file_path: &str,
    reported_name: impl FnOnce() -> String,
) -> GptscriptError {
    let suffix = format!("not found: {workspace_id}/{file_path}");
    if err.to_string().trim_end().ends_with(&suffix) {
        GptscriptError::NotFoundInWorkspace {
            workspace_id: workspace_id.to_string(),
            name: reported_name(),
        }
    } else {
        err
    }
}

fn conflict_or(err: GptscriptError) -> GptscriptError {
    match WorkspaceConflict::parse(&err.to_string()) {
        Some(conflict) => conflict.into(),
        None => err,
    }
}

impl Gptscript {
    async fn workspace_command(&self, path: &str, mut body: Value) -> Result<String> {
        if let Some(map) = body.as_object_mut() {
            map.insert("workspaceTool".into(), json!(self.global.workspace_tool));
            map.insert("env".into(), json!(self.global.env));
        }
        self.run_basic_command(path, Some(body)).await
    }

    /// Create a workspace, optionally seeded from others, and return its ID.
    pub async fn create_workspace(
        &self,
        provider_type: &str,
        from_workspaces: &[String],
    ) -> Result<String> {
        let out = self
            .workspace_command(
                "workspaces/create",
                json!({"providerType": provider_type, "fromWorkspaceIDs": from_workspaces}),
            )
            .await?;
        Ok(out.trim().to_string())
    }

    pub async fn delete_workspace(&self, workspace_id: &str) -> Result<()> {
        if workspace_id.is_empty() {
            return Err(GptscriptError::InvalidArgument(
                "workspace ID cannot be empty".into(),
            ));
        }
        self.workspace_command("workspaces/delete", json!({"id": workspace_id}))
            .await
            .map(drop)
    }

    /// Names of the files in a workspace, optionally under a prefix.
    pub async fn list_files_in_workspace(&self, options: PrefixOptions) -> Result<Vec<String>> {
        let workspace_id = self.workspace_for(options.workspace_id);
        let out = self
            .workspace_command(
                "workspaces/list",
                json!({"id": workspace_id, "prefix": options.prefix}),
            )
            .await?;

        let out = out.trim();
        if out.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(out)?)
    }

    /// Remove every file under a prefix (everything if the prefix is empty).
    pub async fn remove_all(&self, options: PrefixOptions) -> Result<()> {
        let workspace_id = self.workspace_for(options.workspace_id);
        self.workspace_command(
            "workspaces/remove-all-with-prefix",
            json!({"id": workspace_id, "prefix": options.prefix}),
        )
        .await
        .map(drop)
    }

    pub async fn write_file_in_workspace(
        &self,
        file_path: &str,
        contents: &[u8],
        options: WriteFileOptions,
    ) -> Result<()> {
        let workspace_id = self.workspace_for(options.workspace_id);
        self.workspace_command(
            "workspaces/write-file",
            json!({
                "id": workspace_id,
                "contents": STANDARD.encode(contents),
                "filePath": file_path,
                "createRevision": options.create_revision,
                "latestRevision": options.latest_revision.unwrap_or_default(),
            }),
        )
        .await
        .map(drop)
        .map_err(conflict_or)
    }

    pub async fn delete_file_in_workspace(
        &self,
        file_path: &str,
        workspace_id: Option<String>,
    ) -> Result<()> {
        let workspace_id = self.workspace_for(workspace_id);
        self.workspace_command(
            "workspaces/delete-file",
            json!({"id": workspace_id, "filePath": file_path}),
        )
        .await
        .map(drop)
        .map_err(|e| not_found_in_workspace(e, &workspace_id, file_path, || file_path.to_string()))
    }

    pub async fn read_file_in_workspace(
        &self,
        file_path: &str,
        workspace_id: Option<String>,
    ) -> Result<Vec<u8>> {
        let workspace_id = self.workspace_for(workspace_id);
        let out = self
            .workspace_command(
                "workspaces/read-file",
                json!({"id": workspace_id, "filePath": file_path}),
            )
            .await
            .map_err(|e| {
                not_found_in_workspace(e, &workspace_id, file_path, || file_path.to_string())
            })?;
        Ok(STANDARD.decode(out.trim())?)
    }

    pub async fn stat_file_in_workspace(
        &self,
        file_path: &str,
        workspace_id: Option<String>,
    ) -> Result<FileInfo> {
        let workspace_id = self.workspace_for(workspace_id);
        let out = self
            .workspace_command(
                "workspaces/stat-file",
                json!({"id": workspace_id, "filePath": file_path}),
            )
            .await
            .map_err(|e| {
                not_found_in_workspace(e, &workspace_id, file_path, || file_path.to_string())
            })?;
        Ok(serde_json::from_str(&out)?)
    }

    pub async fn list_revisions_for_file_in_workspace(
        &self,
        file_path: &str,
        workspace_id: Option<String>,
    ) -> Result<Vec<RevisionInfo>> {
        let workspace_id = self.workspace_for(workspace_id);
        let out = self
            .workspace_command(
                "workspaces/list-revisions",
                json!({"id": workspace_id, "filePath": file_path}),
            )
            .await
            .map_err(|e| {
                not_found_in_workspace(e, &workspace_id, file_path, || file_path.to_string())
            })?;
        Ok(serde_json::from_str(&out)?)
    }

    pub async fn get_revision_for_file_in_workspace(
        &self,
        file_path: &str,
        revision_id: &str,
        workspace_id: Option<String>,
    ) -> Result<Vec<u8>> {
        let workspace_id = self.workspace_for(workspace_id);
        let out = self
            .workspace_command(
                "workspaces/get-revision",
                json!({"id": workspace_id, "filePath": file_path, "revisionID": revision_id}),
            )
            .await
            .map_err(|e| {
                not_found_in_workspace(e, &workspace_id, file_path, || file_path.to_string())
            })?;
        Ok(STANDARD.decode(out.trim())?)
    }

    pub async fn delete_revision_for_file_in_workspace(
        &self,
        file_path: &str,
        revision_id: &str,
        workspace_id: Option<String>,
    ) -> Result<()> {
        let workspace_id = self.workspace_for(workspace_id);
        self.workspace_command(
            "workspaces/delete-revision",
            json!({"id": workspace_id, "filePath": file_path, "revisionID": revision_id}),
        )
        .await
        .map(drop)
        .map_err(|e| {
            not_found_in_workspace(e, &workspace_id, file_path, || {
                format!("revision {revision_id} for {file_path}")
            })
        })
    }
}

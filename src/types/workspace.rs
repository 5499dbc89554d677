//! Workspace file metadata and per-call options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileInfo {
    #[serde(rename = "workspaceID", alias = "WorkspaceID")]
    pub workspace_id: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Size")]
    pub size: i64,
    #[serde(rename = "modTime", alias = "ModTime")]
    pub mod_time: Option<DateTime<Utc>>,
    #[serde(rename = "mimeType", alias = "MimeType")]
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionInfo {
    #[serde(flatten)]
    pub file: FileInfo,
    #[serde(rename = "revisionID", alias = "RevisionID")]
    pub revision_id: String,
}

/// Options for `write_file_in_workspace`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteFileOptions {
    pub workspace_id: Option<String>,
    /// Whether the engine should keep the previous contents as a revision.
    pub create_revision: Option<bool>,
    /// Fail with a conflict unless this is still the latest revision.
    pub latest_revision: Option<String>,
}

/// Options for listing or removing files by prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixOptions {
    pub workspace_id: Option<String>,
    pub prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn revision_info_accepts_either_casing() {
        let camel: RevisionInfo = serde_json::from_value(json!({
            "workspaceID": "ws", "name": "a.txt", "size": 3,
            "modTime": "2024-05-01T10:00:00Z", "mimeType": "text/plain", "revisionID": "2"
        }))
        .unwrap();
        let pascal: RevisionInfo = serde_json::from_value(json!({
            "WorkspaceID": "ws", "Name": "a.txt", "Size": 3,
            "ModTime": "2024-05-01T10:00:00Z", "MimeType": "text/plain", "RevisionID": "2"
        }))
        .unwrap();

        assert_eq!(camel, pascal);
        assert_eq!(camel.file.size, 3);
        assert_eq!(camel.revision_id, "2");
    }
}

//! Error classification and structured workspace errors.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Request construction, send, or body read failures.
    Transport,
    /// The engine does not know the requested entity.
    NotFound,
    /// Non-success response other than 404.
    Server,
    /// The engine sent something the run did not permit.
    Protocol,
    /// The engine reported a failure of the script itself.
    Engine,
    Cancelled,
    Conflict,
    Configuration,
    Serialization,
    Timeout,
    /// The caller used the API out of order or with bad arguments.
    Usage,
}

/// Optimistic-concurrency conflict reported when writing a workspace file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("conflict: {id}/{name} (latest revision: {latest_revision}, current revision: {current_revision})")]
pub struct WorkspaceConflict {
    pub id: String,
    pub name: String,
    pub latest_revision: String,
    pub current_revision: String,
}

fn conflict_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"conflict: (.+)/([^/]+) \(latest revision: (-?\d+), current revision: (-?\d+)\)\s*$",
        )
        .expect("Invalid workspace conflict pattern")
    })
}

impl WorkspaceConflict {
    /// Parse a conflict out of an engine error message, if it carries one.
    pub fn parse(message: &str) -> Option<Self> {
        let captures = conflict_pattern().captures(message)?;
        Some(Self {
            id: captures[1].to_string(),
            name: captures[2].to_string(),
            latest_revision: captures[3].to_string(),
            current_revision: captures[4].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conflict_from_server_message() {
        let message = "run encountered an error (status 500): conflict: ws-1/notes.txt (latest revision: 3, current revision: 2)";
        let conflict = WorkspaceConflict::parse(message).unwrap();
        assert_eq!(conflict.id, "ws-1");
        assert_eq!(conflict.name, "notes.txt");
        assert_eq!(conflict.latest_revision, "3");
        assert_eq!(conflict.current_revision, "2");
    }

    #[test]
    fn negative_revisions_are_accepted() {
        let conflict =
            WorkspaceConflict::parse("conflict: a/b/c (latest revision: -1, current revision: 0)")
                .unwrap();
        assert_eq!(conflict.id, "a/b");
        assert_eq!(conflict.name, "c");
        assert_eq!(conflict.latest_revision, "-1");
    }

    #[test]
    fn unrelated_message_is_not_a_conflict() {
        assert!(WorkspaceConflict::parse("not found: ws/file").is_none());
    }
}

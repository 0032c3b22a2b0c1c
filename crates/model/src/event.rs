use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What happened to a file, as reported by the host's file-watching
/// subsystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Modified,
    Deleted,
    Moved,
    Copied,
    PropertyChanged,
}

/// A single file-system change surfaced by the host.
///
/// `old_path` is present for moves and for property changes that carry a
/// rename (the old identity is the one the index must forget).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct SourceChangeEvent {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

impl SourceChangeEvent {
    #[must_use]
    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Modified,
            old_path: None,
        }
    }

    #[must_use]
    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Deleted,
            old_path: None,
        }
    }

    #[must_use]
    pub fn moved(path: impl Into<String>, old_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Moved,
            old_path: Some(old_path.into()),
        }
    }

    #[must_use]
    pub fn copied(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Copied,
            old_path: None,
        }
    }

    #[must_use]
    pub fn property_changed(path: impl Into<String>, old_path: Option<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::PropertyChanged,
            old_path,
        }
    }

    /// True for kinds that change file content and warrant re-discovery.
    #[must_use]
    pub const fn is_content_change(&self) -> bool {
        matches!(self.kind, ChangeKind::Modified | ChangeKind::Copied)
    }
}

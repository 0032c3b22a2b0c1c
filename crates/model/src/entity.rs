use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of semantic entity tracked by an index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Span,
    Endpoint,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Span => "span",
            Self::Endpoint => "endpoint",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered occurrence of an entity in the source tree.
///
/// Ordered by id, then file, then offset so location sets iterate
/// deterministically.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub struct EntityLocation {
    pub entity_id: String,
    pub file_uri: String,
    pub offset: u32,
}

impl EntityLocation {
    #[must_use]
    pub fn new(entity_id: impl Into<String>, file_uri: impl Into<String>, offset: u32) -> Self {
        Self {
            entity_id: entity_id.into(),
            file_uri: file_uri.into(),
            offset,
        }
    }
}

use crate::{ProcessContext, Result};
use async_trait::async_trait;
use tracenav_model::EntityLocation;

/// Which part of the source tree a discovery pass should scan.
///
/// Opaque to this crate beyond the project/file split; how a scope maps to
/// actual files is the host code index's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    /// Every indexed source file.
    Project,
    /// A single file, by uri.
    File(String),
}

impl SearchScope {
    #[must_use]
    pub const fn project() -> Self {
        Self::Project
    }

    #[must_use]
    pub fn file(uri: impl Into<String>) -> Self {
        Self::File(uri.into())
    }

    #[must_use]
    pub fn file_uri(&self) -> Option<&str> {
        match self {
            Self::Project => None,
            Self::File(uri) => Some(uri),
        }
    }
}

/// A pluggable, framework-specific scanner locating entities inside a scope.
///
/// Implementations are supplied by the host per supported framework
/// (annotation scanners, call-site matchers). They must tolerate being
/// invoked concurrently for different indexes and should poll
/// [`ProcessContext::check_cancelled`] inside long scans.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Stable name used when recording failures.
    fn name(&self) -> &str;

    /// Every entity occurrence the provider can find inside `scope`.
    async fn discover(
        &self,
        ctx: &ProcessContext,
        scope: &SearchScope,
    ) -> Result<Vec<EntityLocation>>;
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// Cooperative cancellation. Not a failure: short-circuits retries and
    /// the current build instead of being recorded.
    #[error("build cancelled")]
    Cancelled,

    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl DiscoveryError {
    #[must_use]
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

//! Error taxonomy shared by the planner, the cache and the stores.

use thiserror::Error;

/// Result alias used across the crate.
pub type BannerResult<T> = Result<T, BannerError>;

/// Every failure a caller of the banner service can observe.
#[derive(Debug, Error)]
pub enum BannerError {
    /// No banner matches the key or id.
    #[error("banner not found")]
    NotFound,

    /// The banner exists but the caller may not see it.
    #[error("banner is not accessible to this caller")]
    AccessDenied,

    /// A payload violated an attribute-level rule.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Opaque upstream failure (storage unavailable, decode error, ...).
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl BannerError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::ValidationFailed(reason.into())
    }

    /// Whether this is the `NotFound` kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

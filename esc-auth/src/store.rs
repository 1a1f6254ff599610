//! Token store trait and error types

use async_trait::async_trait;
use thiserror::Error;

use crate::token::TokenRecord;

/// Errors that can occur when reading or writing stored tokens
#[derive(Debug, Error)]
pub enum StoreError {
    /// No token has been stored for this audience
    #[error("Token not found for audience {audience:?}")]
    NotFound { audience: String },

    /// The audience cannot be used as a store key
    #[error("Invalid audience {0:?}: must be a non-empty name without path separators")]
    InvalidAudience(String),

    /// File system error, with the path involved
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Stored content could not be encoded or decoded
    #[error("Serialization error on {path}: {message}")]
    Serialization { path: String, message: String },
}

impl StoreError {
    pub fn not_found(audience: impl Into<String>) -> Self {
        Self::NotFound {
            audience: audience.into(),
        }
    }

    pub fn io(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn serialization(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for token store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for one token record per audience.
///
/// Writing a record replaces whatever was stored for that audience.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the record stored for an audience.
    ///
    /// Returns `StoreError::NotFound` if nothing was ever written for it.
    async fn get(&self, audience: &str) -> StoreResult<TokenRecord>;

    /// Store a record for an audience, overwriting any previous one
    async fn put(&self, audience: &str, record: &TokenRecord) -> StoreResult<()>;

    /// Check whether a record exists for an audience
    async fn exists(&self, audience: &str) -> StoreResult<bool> {
        match self.get(audience).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Reject audiences that would escape the store or make no sense as a key
pub(crate) fn validate_audience(audience: &str) -> StoreResult<()> {
    let invalid = audience.is_empty()
        || audience == "."
        || audience == ".."
        || audience.contains(['/', '\\', '\0']);

    if invalid {
        Err(StoreError::InvalidAudience(audience.to_string()))
    } else {
        Ok(())
    }
}

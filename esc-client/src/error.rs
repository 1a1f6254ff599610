//! Client errors and API problem details

use std::collections::BTreeMap;
use std::fmt;

use esc_auth::AuthError;
use esc_core::WaitError;
use serde::Deserialize;
use thiserror::Error;

/// Error body returned by the API on failure (RFC 7807)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub instance: String,
    /// Per-field validation errors, ordered by field name
    pub fields: BTreeMap<String, String>,
}

impl ProblemDetails {
    /// Parse an error body, falling back to a bare status when the body is
    /// not a problem document.
    pub fn from_response_body(status: u16, body: &[u8]) -> Self {
        let mut details: ProblemDetails = serde_json::from_slice(body).unwrap_or_default();
        if details.status == 0 {
            details.status = status;
        }
        details
    }
}

impl fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() && self.detail.is_empty() {
            return write!(f, "Status {}", self.status);
        }

        f.write_str(&self.title)?;
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        for (field, message) in &self.fields {
            write!(f, "\n\t{} - {}", field, message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProblemDetails {}

/// Errors returned by [`Client`](crate::Client) operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Config(String),

    #[error("error obtaining access token: {0}")]
    AccessToken(#[source] AuthError),

    #[error("error sending request: {0}")]
    Transport(#[source] reqwest::Error),

    /// The API rejected the request
    #[error("error {activity}: {problem}")]
    Api {
        activity: String,
        #[source]
        problem: ProblemDetails,
    },

    #[error("error parsing response: {0}")]
    Decode(String),

    #[error(transparent)]
    Wait(WaitError),
}

impl ClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// HTTP status reported by the API, if this is an API error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { problem, .. } => Some(problem.status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<WaitError> for ClientError {
    /// Fetch failures carry the client error that caused them; unwrap it so
    /// callers see the original error.
    fn from(error: WaitError) -> Self {
        match error {
            WaitError::Fetch(cause) => match cause.downcast::<ClientError>() {
                Ok(client_error) => *client_error,
                Err(other) => Self::Wait(WaitError::Fetch(other)),
            },
            other => Self::Wait(other),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

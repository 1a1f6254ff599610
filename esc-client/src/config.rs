//! Client configuration

use std::path::PathBuf;

use esc_auth::{DEFAULT_CLIENT_ID, DEFAULT_IDP_URL, LocalTokenStore, RefreshMode};

use crate::error::{ClientError, ClientResult};

/// Event Store Cloud API used when none is configured
pub const DEFAULT_API_URL: &str = "https://api.eventstore.cloud";

/// Everything needed to build a [`Client`](crate::Client)
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Event Store Cloud API
    pub url: String,
    /// Identity provider URL; blank means [`DEFAULT_IDP_URL`]
    pub identity_provider_url: String,
    /// OAuth client id; blank means [`DEFAULT_CLIENT_ID`]
    pub client_id: String,
    pub refresh_token: String,
    /// Directory holding cached access tokens
    pub token_store: PathBuf,
    /// Organization used when a caller does not name one
    pub organization_id: Option<String>,
    pub refresh_mode: RefreshMode,
    /// PEM certificate to verify access tokens with, instead of the bundled one
    pub certificate_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            identity_provider_url: DEFAULT_IDP_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            refresh_token: String::new(),
            token_store: LocalTokenStore::default_dir(),
            organization_id: None,
            refresh_mode: RefreshMode::default(),
            certificate_path: None,
        }
    }
}

impl Config {
    /// Check the configuration and create the token store directory if needed
    pub fn validate(&self) -> ClientResult<()> {
        if self.url.trim().is_empty() {
            return Err(ClientError::config("URL is required"));
        }

        LocalTokenStore::new(&self.token_store)
            .ensure_dir()
            .map_err(|e| ClientError::config(format!("error preparing token store: {}", e)))
    }

    pub fn identity_provider_url(&self) -> &str {
        non_blank(&self.identity_provider_url).unwrap_or(DEFAULT_IDP_URL)
    }

    pub fn client_id(&self) -> &str {
        non_blank(&self.client_id).unwrap_or(DEFAULT_CLIENT_ID)
    }

    /// No certificate configured, so tokens are checked against the bundled placeholder
    pub fn uses_bundled_certificate(&self) -> bool {
        self.certificate_path.is_none()
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

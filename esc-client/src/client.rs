//! Authenticated REST helper for the Event Store Cloud API

use std::sync::Arc;

use esc_auth::{LocalTokenStore, TokenCache, TokenCacheConfig, TokenValidator};
use esc_core::StateWaiter;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::{ClientError, ClientResult, ProblemDetails};

/// Client for the Event Store Cloud API.
///
/// Every request carries a bearer token from the [`TokenCache`]. Resource
/// operations live next to their models in [`crate::resources`].
pub struct Client {
    api_url: Url,
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    organization_id: Option<String>,
    pub(crate) waiter: StateWaiter,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("api_url", &self.api_url.as_str())
            .field("organization_id", &self.organization_id)
            .field("tokens", &self.tokens)
            .field("waiter", &self.waiter)
            .finish()
    }
}

impl Client {
    /// Build a client with a token cache backed by the configured directory
    pub fn new(config: &Config) -> ClientResult<Self> {
        config.validate()?;

        let validator = match &config.certificate_path {
            Some(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    ClientError::config(format!(
                        "error reading certificate {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                TokenValidator::try_from_certificate_pem(pem)
                    .map_err(|e| ClientError::config(e.to_string()))?
            }
            None => {
                warn!(
                    "No signing certificate configured; the bundled certificate is a placeholder, \
                     pass --certificate (certificate_path) to verify real tokens"
                );
                TokenValidator::embedded()
            }
        };

        let mut cache_config = TokenCacheConfig::new(config.refresh_token.clone());
        cache_config.idp_url = config.identity_provider_url().to_string();
        cache_config.client_id = config.client_id().to_string();
        cache_config.refresh_mode = config.refresh_mode;

        let store = Arc::new(LocalTokenStore::new(&config.token_store));
        let tokens = TokenCache::new(cache_config, store, validator)
            .map_err(|e| ClientError::config(e.to_string()))?;

        let client = Self::with_token_cache(&config.url, Arc::new(tokens))?;
        Ok(match &config.organization_id {
            Some(id) => client.with_organization_id(id.clone()),
            None => client,
        })
    }

    /// Build a client around an existing token cache
    pub fn with_token_cache(api_url: &str, tokens: Arc<TokenCache>) -> ClientResult<Self> {
        let api_url = Url::parse(api_url).map_err(|e| {
            ClientError::config(format!("invalid service URL {:?}: {}", api_url, e))
        })?;
        if api_url.cannot_be_a_base() {
            return Err(ClientError::config(format!(
                "invalid service URL {:?}: cannot be a base",
                api_url.as_str()
            )));
        }

        Ok(Self {
            api_url,
            http: reqwest::Client::new(),
            tokens,
            organization_id: None,
            waiter: StateWaiter::default(),
        })
    }

    pub fn with_organization_id(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Replace the waiter used by the `*_wait_for_state` operations
    pub fn with_waiter(mut self, waiter: StateWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Configured default organization
    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    /// URL under the API base made of the given path segments.
    ///
    /// Segments are percent-encoded, so identifiers cannot change the path.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Start a request with the bearer token attached
    pub(crate) async fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> ClientResult<RequestBuilder> {
        let token = self
            .tokens
            .access_token(false)
            .await
            .map_err(ClientError::AccessToken)?;

        let url = self.endpoint(segments);
        debug!(%method, %url, "Sending API request");
        Ok(self
            .http
            .request(method, url)
            .header(AUTHORIZATION, token.bearer()))
    }

    /// Send a request without a body
    pub(crate) async fn send(
        &self,
        method: Method,
        segments: &[&str],
        activity: &str,
        accepted: &[StatusCode],
    ) -> ClientResult<Response> {
        let request = self.request(method, segments).await?;
        execute(request, activity, accepted).await
    }

    /// Send a request with a JSON body
    pub(crate) async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
        activity: &str,
        accepted: &[StatusCode],
    ) -> ClientResult<Response> {
        let request = self.request(method, segments).await?.json(body);
        execute(request, activity, accepted).await
    }
}

/// Status codes accepted by reads and creates
pub(crate) const OK: &[StatusCode] = &[StatusCode::OK];

/// Status codes accepted by updates and deletes
pub(crate) const OK_OR_NO_CONTENT: &[StatusCode] = &[StatusCode::OK, StatusCode::NO_CONTENT];

async fn execute(
    request: RequestBuilder,
    activity: &str,
    accepted: &[StatusCode],
) -> ClientResult<Response> {
    let response = request.send().await.map_err(ClientError::Transport)?;
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(response);
    }

    let body = response.bytes().await.map_err(ClientError::Transport)?;
    Err(ClientError::Api {
        activity: activity.to_string(),
        problem: ProblemDetails::from_response_body(status.as_u16(), &body),
    })
}

/// Decode a JSON response body
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let body = response.bytes().await.map_err(ClientError::Transport)?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

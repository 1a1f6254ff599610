//! Token Cache - Hand out valid access tokens, refreshing only when needed
//!
//! A cached token is returned as long as it validates. Otherwise the cache
//! exchanges the configured refresh token at the identity provider and
//! stores the new record, replacing the old one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::store::{StoreError, TokenStore};
use crate::token::TokenRecord;
use crate::validator::TokenValidator;

/// Identity provider used when none is configured
pub const DEFAULT_IDP_URL: &str = "https://identity.eventstore.com";

/// OAuth client id of the Event Store Cloud tooling
pub const DEFAULT_CLIENT_ID: &str = "OraYp3cFES9O8aWuQtnqi1A7m534iTwt";

/// Audience of tokens for the Event Store Cloud API, also the store key
pub const DEFAULT_AUDIENCE: &str = "api.eventstore.cloud";

const TOKEN_ENDPOINT_PATH: &str = "/oauth/token";

/// Errors returned while obtaining an access token
#[derive(Debug, Error)]
pub enum AuthError {
    /// A stored record exists but could not be read
    #[error("error getting token from store: {0}")]
    Store(#[source] StoreError),

    /// The identity provider could not be reached
    #[error("error requesting access token: {0}")]
    Request(#[source] reqwest::Error),

    /// The identity provider answered with something other than 200
    #[error("error {0} requesting access token")]
    Status(u16),

    /// The identity provider's answer is not a token response
    #[error("error parsing IDP response: {0}")]
    Decode(String),

    /// The new token could not be persisted
    #[error("error writing token to store: {0}")]
    Persist(#[source] StoreError),

    #[error("invalid identity provider URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Result type for token operations
pub type AuthResult<T> = Result<T, AuthError>;

/// How concurrent refreshes for the same audience are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshMode {
    /// One refresh per audience at a time. Callers that queued behind a
    /// refresh re-read the cache first and reuse the token it produced.
    #[default]
    Serialized,
    /// No coordination: concurrent callers each refresh, last write wins
    Unsynchronized,
}

/// Settings for talking to the identity provider
#[derive(Debug, Clone)]
pub struct TokenCacheConfig {
    pub idp_url: String,
    pub client_id: String,
    pub refresh_token: String,
    /// Audience used by [`TokenCache::access_token`]
    pub audience: String,
    pub refresh_mode: RefreshMode,
}

impl TokenCacheConfig {
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            idp_url: DEFAULT_IDP_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            refresh_token: refresh_token.into(),
            audience: DEFAULT_AUDIENCE.to_string(),
            refresh_mode: RefreshMode::default(),
        }
    }
}

/// Access-token cache backed by a [`TokenStore`]
pub struct TokenCache {
    store: Arc<dyn TokenStore>,
    validator: TokenValidator,
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    refresh_token: String,
    audience: String,
    refresh_mode: RefreshMode,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("audience", &self.audience)
            .field("refresh_mode", &self.refresh_mode)
            .field("validator", &self.validator)
            .finish()
    }
}

impl TokenCache {
    pub fn new(
        config: TokenCacheConfig,
        store: Arc<dyn TokenStore>,
        validator: TokenValidator,
    ) -> AuthResult<Self> {
        let idp_url = Url::parse(&config.idp_url).map_err(|e| AuthError::InvalidUrl {
            url: config.idp_url.clone(),
            message: e.to_string(),
        })?;
        let token_url = idp_url
            .join(TOKEN_ENDPOINT_PATH)
            .map_err(|e| AuthError::InvalidUrl {
                url: config.idp_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            store,
            validator,
            http: reqwest::Client::new(),
            token_url,
            client_id: config.client_id,
            refresh_token: config.refresh_token,
            audience: config.audience,
            refresh_mode: config.refresh_mode,
            refresh_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Use a preconfigured HTTP client (proxies, timeouts, TLS settings)
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Audience of [`access_token`](Self::access_token)
    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Get a valid token for an audience.
    ///
    /// Without `force_refresh`, a stored token that validates is returned
    /// without any network call. Every other path makes exactly one request
    /// to the identity provider and, if it succeeds, one store write.
    pub async fn get_token(&self, audience: &str, force_refresh: bool) -> AuthResult<TokenRecord> {
        if !force_refresh && let Some(record) = self.cached(audience).await? {
            return Ok(record);
        }

        match self.refresh_mode {
            RefreshMode::Unsynchronized => self.refresh_and_store(audience).await,
            RefreshMode::Serialized => {
                let lock = self.refresh_lock(audience);
                let _guard = lock.lock().await;

                // Someone else may have refreshed while we were queued
                if !force_refresh && let Some(record) = self.cached(audience).await? {
                    return Ok(record);
                }
                self.refresh_and_store(audience).await
            }
        }
    }

    /// Token for the configured audience
    pub async fn access_token(&self, force_refresh: bool) -> AuthResult<TokenRecord> {
        self.get_token(&self.audience, force_refresh).await
    }

    /// Obtain a token for the configured audience, discarding it
    pub async fn refresh(&self, force: bool) -> AuthResult<()> {
        self.access_token(force).await.map(|_| ())
    }

    /// Read the stored record for an audience without validating it
    pub async fn inspect(&self, audience: &str) -> AuthResult<TokenRecord> {
        self.store.get(audience).await.map_err(AuthError::Store)
    }

    /// Stored record if it exists and validates
    async fn cached(&self, audience: &str) -> AuthResult<Option<TokenRecord>> {
        match self.store.get(audience).await {
            Ok(record) => {
                if self.validator.is_valid(&record) {
                    debug!(audience, "Using cached access token");
                    Ok(Some(record))
                } else {
                    info!(audience, "Cached access token is no longer valid");
                    Ok(None)
                }
            }
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(AuthError::Store(e)),
        }
    }

    fn refresh_lock(&self, audience: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(audience.to_string()).or_default().clone()
    }

    async fn refresh_and_store(&self, audience: &str) -> AuthResult<TokenRecord> {
        info!(audience, url = %self.token_url, "Requesting access token from identity provider");

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(AuthError::Request)?;

        if response.status() != StatusCode::OK {
            return Err(AuthError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await.map_err(AuthError::Request)?;
        let record: TokenRecord =
            serde_json::from_slice(&body).map_err(|e| AuthError::Decode(e.to_string()))?;

        self.store
            .put(audience, &record)
            .await
            .map_err(AuthError::Persist)?;

        debug!(audience, "Stored refreshed access token");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreResult;
    use crate::stores::{LocalTokenStore, MemoryTokenStore};
    use async_trait::async_trait;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SIGNING_KEY: &str = include_str!("../testdata/signing_key.pem");
    const SIGNING_CERT: &str = include_str!("../testdata/signing_cert.pem");

    fn mint(exp_offset: i64) -> String {
        let exp = get_current_timestamp() as i64 + exp_offset;
        let key = EncodingKey::from_rsa_pem(SIGNING_KEY.as_bytes()).unwrap();
        encode(
            &Header::new(Algorithm::RS256),
            &json!({"aud": "https://api.eventstore.cloud", "exp": exp, "sub": "user-1"}),
            &key,
        )
        .unwrap()
    }

    fn token_response(access_token: &str) -> serde_json::Value {
        json!({
            "access_token": access_token,
            "scope": "openid offline_access",
            "expires_in": 86400,
            "token_type": "Bearer"
        })
    }

    fn cache_for(server: &MockServer, store: Arc<dyn TokenStore>, mode: RefreshMode) -> TokenCache {
        let mut config = TokenCacheConfig::new("refresh-secret");
        config.idp_url = server.uri();
        config.client_id = "client-1".to_string();
        config.refresh_mode = mode;

        let validator = TokenValidator::try_from_certificate_pem(SIGNING_CERT).unwrap();
        TokenCache::new(config, store, validator).unwrap()
    }

    #[tokio::test]
    async fn test_cold_cache_refreshes_and_stores() {
        let server = MockServer::start().await;
        let access_token = mint(3600);
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=client-1"))
            .and(body_string_contains("refresh_token=refresh-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&access_token)))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let cache = cache_for(&server, store.clone(), RefreshMode::Serialized);

        let record = cache.get_token(DEFAULT_AUDIENCE, false).await.unwrap();

        assert_eq!(record.access_token, access_token);
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get(DEFAULT_AUDIENCE).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_valid_cached_token_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&mint(3600))))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let cached = TokenRecord::new(mint(3600));
        store.put(DEFAULT_AUDIENCE, &cached).await.unwrap();
        let cache = cache_for(&server, store.clone(), RefreshMode::Serialized);

        let record = cache.get_token(DEFAULT_AUDIENCE, false).await.unwrap();

        assert_eq!(record, cached);
        assert_eq!(store.writes(), 1);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_cached_token_is_refreshed() {
        let server = MockServer::start().await;
        let fresh = mint(3600);
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&fresh)))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        store
            .put(DEFAULT_AUDIENCE, &TokenRecord::new(mint(-300)))
            .await
            .unwrap();
        let cache = cache_for(&server, store.clone(), RefreshMode::Serialized);

        let record = cache.get_token(DEFAULT_AUDIENCE, false).await.unwrap();

        assert_eq!(record.access_token, fresh);
        assert_eq!(store.get(DEFAULT_AUDIENCE).await.unwrap().access_token, fresh);
    }

    #[tokio::test]
    async fn test_force_refresh_ignores_valid_cache() {
        let server = MockServer::start().await;
        let fresh = mint(7200);
        let store = Arc::new(MemoryTokenStore::new());
        store
            .put(DEFAULT_AUDIENCE, &TokenRecord::new(mint(3600)))
            .await
            .unwrap();

        for mode in [RefreshMode::Serialized, RefreshMode::Unsynchronized] {
            server.reset().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&fresh)))
                .expect(1)
                .mount(&server)
                .await;

            let cache = cache_for(&server, store.clone(), mode);
            let record = cache.get_token(DEFAULT_AUDIENCE, true).await.unwrap();
            assert_eq!(record.access_token, fresh);

            server.verify().await;
        }
    }

    #[tokio::test]
    async fn test_force_refresh_cold_cache() {
        let server = MockServer::start().await;
        let fresh = mint(3600);

        for mode in [RefreshMode::Serialized, RefreshMode::Unsynchronized] {
            server.reset().await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&fresh)))
                .expect(1)
                .mount(&server)
                .await;

            let store = Arc::new(MemoryTokenStore::new());
            let cache = cache_for(&server, store.clone(), mode);
            let record = cache.get_token(DEFAULT_AUDIENCE, true).await.unwrap();

            assert_eq!(record.access_token, fresh);
            assert_eq!(store.writes(), 1);
            server.verify().await;
        }
    }

    #[tokio::test]
    async fn test_force_refresh_expired_cache() {
        let server = MockServer::start().await;
        let fresh = mint(3600);

        for mode in [RefreshMode::Serialized, RefreshMode::Unsynchronized] {
            server.reset().await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&fresh)))
                .expect(1)
                .mount(&server)
                .await;

            let store = Arc::new(MemoryTokenStore::new());
            store
                .put(DEFAULT_AUDIENCE, &TokenRecord::new(mint(-300)))
                .await
                .unwrap();
            let cache = cache_for(&server, store.clone(), mode);
            let record = cache.get_token(DEFAULT_AUDIENCE, true).await.unwrap();

            assert_eq!(record.access_token, fresh);
            // Seed write plus the single refresh
            assert_eq!(store.writes(), 2);
            assert_eq!(store.get(DEFAULT_AUDIENCE).await.unwrap().access_token, fresh);
            server.verify().await;
        }
    }

    #[tokio::test]
    async fn test_non_200_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let cache = cache_for(&server, store.clone(), RefreshMode::Serialized);

        let err = cache.get_token(DEFAULT_AUDIENCE, false).await.unwrap_err();

        assert!(matches!(err, AuthError::Status(403)));
        assert_eq!(err.to_string(), "error 403 requesting access token");
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_response_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let cache = cache_for(&server, store.clone(), RefreshMode::Serialized);

        let err = cache.get_token(DEFAULT_AUDIENCE, false).await.unwrap_err();

        assert!(matches!(err, AuthError::Decode(_)));
        assert!(err.to_string().starts_with("error parsing IDP response"));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_transport_error() {
        let mut config = TokenCacheConfig::new("refresh-secret");
        // Nothing listens on the discard port
        config.idp_url = "http://127.0.0.1:9".to_string();
        let cache = TokenCache::new(
            config,
            Arc::new(MemoryTokenStore::new()),
            TokenValidator::try_from_certificate_pem(SIGNING_CERT).unwrap(),
        )
        .unwrap();

        let err = cache.get_token(DEFAULT_AUDIENCE, false).await.unwrap_err();

        assert!(matches!(err, AuthError::Request(_)));
        assert!(err.to_string().starts_with("error requesting access token"));
    }

    #[tokio::test]
    async fn test_unreadable_store_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&mint(3600))))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_AUDIENCE), "{ not json").unwrap();
        let store = Arc::new(LocalTokenStore::new(dir.path()));
        let cache = cache_for(&server, store, RefreshMode::Serialized);

        let err = cache.get_token(DEFAULT_AUDIENCE, false).await.unwrap_err();

        assert!(matches!(err, AuthError::Store(StoreError::Serialization { .. })));
        assert!(err.to_string().starts_with("error getting token from store"));
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl TokenStore for ReadOnlyStore {
        async fn get(&self, audience: &str) -> StoreResult<TokenRecord> {
            Err(StoreError::not_found(audience))
        }

        async fn put(&self, audience: &str, _record: &TokenRecord) -> StoreResult<()> {
            Err(StoreError::io(format!("/ro/{}", audience), "read-only file system"))
        }
    }

    #[tokio::test]
    async fn test_persist_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&mint(3600))))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server, Arc::new(ReadOnlyStore), RefreshMode::Serialized);

        let err = cache.get_token(DEFAULT_AUDIENCE, false).await.unwrap_err();

        assert!(matches!(err, AuthError::Persist(StoreError::Io { .. })));
        assert_eq!(
            err.to_string(),
            "error writing token to store: I/O error on /ro/api.eventstore.cloud: read-only file system"
        );
    }

    #[tokio::test]
    async fn test_local_store_persists_across_caches() {
        let server = MockServer::start().await;
        let access_token = mint(3600);
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&access_token)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("tokens");

        let first = cache_for(
            &server,
            Arc::new(LocalTokenStore::new(&store_dir)),
            RefreshMode::Serialized,
        );
        first.access_token(false).await.unwrap();

        // A second process reading the same directory reuses the token
        let second = cache_for(
            &server,
            Arc::new(LocalTokenStore::new(&store_dir)),
            RefreshMode::Serialized,
        );
        let record = second.access_token(false).await.unwrap();
        assert_eq!(record.access_token, access_token);

        let inspected = second.inspect(DEFAULT_AUDIENCE).await.unwrap();
        assert_eq!(inspected, record);
    }

    #[tokio::test]
    async fn test_inspect_missing_token() {
        let server = MockServer::start().await;
        let cache = cache_for(
            &server,
            Arc::new(MemoryTokenStore::new()),
            RefreshMode::Serialized,
        );

        let err = cache.inspect("never-written").await.unwrap_err();
        assert!(matches!(err, AuthError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_serialized_mode_coalesces_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_response(&mint(3600)))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let cache = cache_for(&server, store.clone(), RefreshMode::Serialized);

        let (a, b) = tokio::join!(
            cache.get_token(DEFAULT_AUDIENCE, false),
            cache.get_token(DEFAULT_AUDIENCE, false)
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_unsynchronized_mode_races() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_response(&mint(3600)))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let cache = cache_for(&server, store.clone(), RefreshMode::Unsynchronized);

        let (a, b) = tokio::join!(
            cache.get_token(DEFAULT_AUDIENCE, false),
            cache.get_token(DEFAULT_AUDIENCE, false)
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn test_token_url() {
        let mut config = TokenCacheConfig::new("r");
        config.idp_url = "https://identity.example.com/some/base".to_string();
        let cache = TokenCache::new(
            config,
            Arc::new(MemoryTokenStore::new()),
            TokenValidator::embedded(),
        )
        .unwrap();
        assert_eq!(
            cache.token_url.as_str(),
            "https://identity.example.com/oauth/token"
        );
    }

    #[test]
    fn test_invalid_idp_url() {
        let mut config = TokenCacheConfig::new("r");
        config.idp_url = "not a url".to_string();
        let result = TokenCache::new(
            config,
            Arc::new(MemoryTokenStore::new()),
            TokenValidator::embedded(),
        );
        assert!(matches!(result, Err(AuthError::InvalidUrl { .. })));
    }
}

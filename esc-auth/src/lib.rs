//! Access tokens for the Event Store Cloud API
//!
//! - [`TokenRecord`]: the token response of the identity provider
//! - [`TokenStore`]: per-audience persistence, with local and in-memory backends
//! - [`TokenValidator`]: RS256 signature and time-claim checks
//! - [`TokenCache`]: returns cached tokens while valid, refreshes otherwise

pub mod cache;
pub mod store;
pub mod stores;
pub mod token;
pub mod validator;

pub use cache::{
    AuthError, AuthResult, DEFAULT_AUDIENCE, DEFAULT_CLIENT_ID, DEFAULT_IDP_URL, RefreshMode,
    TokenCache, TokenCacheConfig,
};
pub use store::{StoreError, StoreResult, TokenStore};
pub use stores::{LocalTokenStore, MemoryTokenStore};
pub use token::TokenRecord;
pub use validator::{
    AccessTokenClaims, Audience, TokenValidationError, TokenValidator, ValidatedToken,
};

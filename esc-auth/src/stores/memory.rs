//! In-memory token store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::store::{StoreError, StoreResult, TokenStore, validate_audience};
use crate::token::TokenRecord;

/// Token store that keeps records in process memory.
///
/// Useful when embedding the client without a writable home directory, and
/// in tests that need to count store writes.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, TokenRecord>>,
    writes: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, audience: &str) -> StoreResult<TokenRecord> {
        validate_audience(audience)?;
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .get(audience)
            .cloned()
            .ok_or_else(|| StoreError::not_found(audience))
    }

    async fn put(&self, audience: &str, record: &TokenRecord) -> StoreResult<()> {
        validate_audience(audience)?;
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(audience.to_string(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

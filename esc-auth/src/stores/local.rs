//! Local directory token store
//!
//! Each audience gets one JSON file inside the store directory, named after
//! the audience. Files are only readable by the owning user, and the
//! directory is created owner-only on first write.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::store::{StoreError, StoreResult, TokenStore, validate_audience};
use crate::token::TokenRecord;

/// Token store backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalTokenStore {
    dir: PathBuf,
}

impl LocalTokenStore {
    /// Directory used when none is configured, relative to `$HOME`
    pub const DEFAULT_DIR: &'static str = ".esctf/tokens";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$HOME/.esctf/tokens`, falling back to a relative path without `$HOME`
    pub fn default_dir() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(Self::DEFAULT_DIR),
            None => PathBuf::from(Self::DEFAULT_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding the record for an audience
    pub fn file_path(&self, audience: &str) -> StoreResult<PathBuf> {
        validate_audience(audience)?;
        Ok(self.dir.join(audience))
    }

    /// Create the store directory (owner-only) if it does not exist yet
    pub fn ensure_dir(&self) -> StoreResult<()> {
        if self.dir.is_dir() {
            return Ok(());
        }

        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        builder
            .create(&self.dir)
            .map_err(|e| StoreError::io(self.dir.display(), format!("cannot create path: {}", e)))
    }
}

impl Default for LocalTokenStore {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

#[async_trait]
impl TokenStore for LocalTokenStore {
    async fn get(&self, audience: &str) -> StoreResult<TokenRecord> {
        let path = self.file_path(audience)?;

        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::not_found(audience));
            }
            Err(e) => {
                return Err(StoreError::io(
                    path.display(),
                    format!("error reading token: {}", e),
                ));
            }
        };

        serde_json::from_slice(&content).map_err(|e| {
            StoreError::serialization(path.display(), format!("error decoding json token: {}", e))
        })
    }

    async fn put(&self, audience: &str, record: &TokenRecord) -> StoreResult<()> {
        let path = self.file_path(audience)?;
        self.ensure_dir()?;

        let content = serde_json::to_vec(record)
            .map_err(|e| StoreError::serialization(path.display(), e))?;

        // Readers see either the old file or the new one, never a partial write
        let write_error = |e: std::io::Error| {
            StoreError::io(path.display(), format!("error writing token to store: {}", e))
        };
        let mut file = NamedTempFile::new_in(&self.dir).map_err(write_error)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(write_error)?;
        }
        file.write_all(&content).map_err(write_error)?;
        file.persist(&path).map_err(|e| write_error(e.error))?;

        Ok(())
    }

    async fn exists(&self, audience: &str) -> StoreResult<bool> {
        Ok(self.file_path(audience)?.exists())
    }
}

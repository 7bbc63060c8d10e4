//! The ephemeral secret store.
//!
//! [`SecretStore`] is the single source of truth for whether a secret exists.
//! Every backend must uphold the same contract:
//!
//! - `get` re-checks expiry on every call, whether or not a sweep has run;
//! - a view-once record is removed in the same critical section that hands it
//!   to the caller, so among any number of concurrent readers exactly one
//!   succeeds;
//! - `get` reports absent, expired and consumed records identically;
//! - `delete` is idempotent.

pub mod clock;
pub mod db;
pub mod memory;
pub mod model;
pub mod sweep;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use db::RedbStore;
pub use memory::MemoryStore;
pub use model::{
    generate_id, is_valid_id, AccessMetadata, ContentDescriptor, NewSecret, SecretRecord,
};
pub use sweep::spawn_sweep;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed input to `put`.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Never existed, expired, or already consumed. Deliberately indistinct.
    #[error("not found")]
    NotFound,

    /// A live record already holds this id.
    #[error("id already in use")]
    DuplicateId,

    /// The backing medium failed.
    #[error("storage backend: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Keyed repository of [`SecretRecord`]s. Implementations are shared across
/// request handlers behind an `Arc`.
pub trait SecretStore: Send + Sync {
    /// Insert a new record; `expires_at` is `now + ttl_seconds` rounded up to a whole second.
    fn put(&self, id: &str, secret: NewSecret) -> Result<SecretRecord>;

    /// Fetch a live record, consuming it if it is view-once.
    fn get(&self, id: &str) -> Result<SecretRecord>;

    /// Remove a record. Absent ids are not an error.
    fn delete(&self, id: &str) -> Result<()>;

    /// Drop every expired record; returns how many were removed.
    fn sweep_expired(&self) -> Result<usize>;

    /// Number of records currently held, including expired ones not yet swept.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Shared validation for every backend's `put`.
pub(crate) fn validate_new(id: &str, secret: &NewSecret) -> Result<()> {
    if !is_valid_id(id) {
        return Err(StoreError::Validation(format!(
            "id must be 1-{} characters of [A-Za-z0-9_-]",
            model::MAX_ID_LEN
        )));
    }
    if secret.ttl_seconds <= 0 {
        return Err(StoreError::Validation("ttl must be positive".into()));
    }
    if secret.ciphertext.is_empty() {
        return Err(StoreError::Validation("ciphertext must not be empty".into()));
    }
    Ok(())
}

//! Token store for registry-gate
//!
//! This module defines the token store trait and its implementations. The
//! store is the source of truth for a token's remaining-use budget; the
//! signature on the token itself never grants reuse beyond what the store
//! records.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryTokenStore;
pub use sqlite::SqliteTokenStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::TokenRecord;

/// Durable key-value store of token records, keyed by token id
///
/// It uses `async_trait` for async methods and `mockall::automock` for
/// testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a freshly issued record
    async fn insert(&self, record: &TokenRecord) -> Result<(), StoreError>;

    /// Point lookup, without consuming a use
    async fn get(&self, token_id: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Atomically consume one use and return the post-decrement record
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist, is
    /// expired, or has no uses left; in that case nothing is mutated. When the
    /// decrement reaches zero the record is deleted in the same atomic step,
    /// so no caller can observe a present-but-zero record. Under concurrent
    /// calls for the same id, each remaining use is granted to exactly one
    /// caller.
    async fn consume(&self, token_id: &str) -> Result<TokenRecord, StoreError>;

    /// Delete the record unconditionally; idempotent
    async fn revoke(&self, token_id: &str) -> Result<(), StoreError>;

    /// Remove expired records, returning how many were deleted
    ///
    /// Expired records are already rejected by `consume`; this pass only
    /// bounds memory/disk growth.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

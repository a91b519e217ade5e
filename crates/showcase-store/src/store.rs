//! The session record store abstraction.

use async_trait::async_trait;

use showcase_models::{SessionId, SessionRecord};

use crate::error::StoreResult;

/// Durable per-session records keyed by session id.
///
/// Writes replace the whole record. Callers read-modify-write at pipeline
/// checkpoints; only one job touches a given session at a time.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a record, `None` if it does not exist.
    async fn get(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>>;

    /// Create or replace a record.
    async fn put(&self, record: &SessionRecord) -> StoreResult<()>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: &SessionId) -> StoreResult<bool>;

    /// Ids of all stored records, sorted.
    async fn list_ids(&self) -> StoreResult<Vec<SessionId>>;

    /// All stored records. Records that vanish or fail to load mid-scan are skipped.
    async fn list(&self) -> StoreResult<Vec<SessionRecord>> {
        let mut records = Vec::new();
        for id in self.list_ids().await? {
            match self.get(&id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!(session_id = %id, "Skipping unreadable session record: {}", e),
            }
        }
        Ok(records)
    }
}

//! Redis backend.
//!
//! Each record is a JSON string at `<prefix>:session:<id>`; the set
//! `<prefix>:sessions` indexes the ids.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use showcase_models::{SessionId, SessionRecord};

use crate::error::StoreResult;
use crate::store::SessionStore;

/// Redis-backed session store.
pub struct RedisSessionStore {
    client: redis::Client,
    prefix: String,
}

impl RedisSessionStore {
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    fn record_key(&self, id: &SessionId) -> String {
        format!("{}:session:{}", self.prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:sessions", self.prefix)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(self.record_key(id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &SessionRecord) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;

        redis::pipe()
            .atomic()
            .set(self.record_key(&record.id), payload)
            .ignore()
            .sadd(self.index_key(), record.id.as_str())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(session_id = %record.id, status = %record.status, "Stored session record");
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (removed, _): (u32, u32) = redis::pipe()
            .atomic()
            .del(self.record_key(id))
            .srem(self.index_key(), id.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn list_ids(&self) -> StoreResult<Vec<SessionId>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let members: Vec<String> = conn.smembers(self.index_key()).await?;
        let mut ids: Vec<SessionId> = members.into_iter().map(SessionId::from_string).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use showcase_models::SourceKind;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[test]
    fn test_key_layout() {
        let store = RedisSessionStore::new("redis://localhost:6379", "showcase").unwrap();
        assert_eq!(
            store.record_key(&SessionId::from_string("abc")),
            "showcase:session:abc"
        );
        assert_eq!(store.index_key(), "showcase:sessions");
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_roundtrip_against_redis() {
        let prefix = format!("showcase-test-{}", uuid::Uuid::new_v4().simple());
        let store = RedisSessionStore::new(&redis_url(), prefix).unwrap();
        let now = Utc::now();
        let record = SessionRecord::new(
            SessionId::new(),
            SourceKind::RemoteUrl,
            now,
            now + Duration::days(1),
            now + Duration::days(2),
        )
        .with_source_url("https://example.com/a.zip");

        store.put(&record).await.unwrap();
        assert_eq!(store.get(&record.id).await.unwrap(), Some(record.clone()));
        assert_eq!(store.list_ids().await.unwrap(), vec![record.id.clone()]);
        assert!(store.delete(&record.id).await.unwrap());
        assert!(store.list_ids().await.unwrap().is_empty());
    }
}

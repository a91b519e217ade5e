//! Store selection from the environment.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::fs::FsSessionStore;
use crate::redis_store::RedisSessionStore;
use crate::store::SessionStore;

/// Which backend holds session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Fs,
    Redis,
}

impl std::str::FromStr for StoreBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fs" | "file" | "filesystem" => Ok(StoreBackend::Fs),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(StoreError::UnknownBackend(other.to_string())),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Record directory for the filesystem backend
    pub sessions_dir: PathBuf,
    pub redis_url: String,
    /// Key prefix for the Redis backend
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Fs,
            sessions_dir: PathBuf::from("data/sessions"),
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "showcase".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let defaults = Self::default();
        let backend = match std::env::var("SHOWCASE_STORE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.backend,
        };
        Ok(Self {
            backend,
            sessions_dir: std::env::var("SHOWCASE_SESSIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.sessions_dir),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("SHOWCASE_STORE_PREFIX").unwrap_or(defaults.key_prefix),
        })
    }

    /// Construct the configured backend.
    pub async fn connect(&self) -> StoreResult<Arc<dyn SessionStore>> {
        Ok(match self.backend {
            StoreBackend::Fs => Arc::new(FsSessionStore::open(&self.sessions_dir).await?),
            StoreBackend::Redis => {
                Arc::new(RedisSessionStore::new(&self.redis_url, self.key_prefix.clone())?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("fs".parse::<StoreBackend>().unwrap(), StoreBackend::Fs);
        assert_eq!(" Redis ".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[tokio::test]
    async fn test_connect_fs() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StoreConfig {
            sessions_dir: dir.path().join("records"),
            ..Default::default()
        };
        let store = config.connect().await.unwrap();
        assert!(store.list_ids().await.unwrap().is_empty());
        assert!(dir.path().join("records").is_dir());
    }
}

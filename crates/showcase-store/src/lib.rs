//! Session record storage.
//!
//! One record per session, keyed by session id, behind the [`SessionStore`]
//! trait. Two backends:
//! - [`FsSessionStore`]: a JSON document per session on local disk
//! - [`RedisSessionStore`]: JSON strings in Redis with an id index set

pub mod config;
pub mod error;
pub mod fs;
pub mod redis_store;
pub mod store;

pub use config::{StoreBackend, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use fs::FsSessionStore;
pub use redis_store::RedisSessionStore;
pub use store::SessionStore;

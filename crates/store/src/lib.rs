//! LiberatID Store - OpenID relying party 的 association 与 nonce 存储
//!
//! 提供以下功能：
//! 1. association 的保存、按 handle 或最近签发查询、删除与过期清理
//! 2. nonce 的一次性使用校验（时钟偏差窗口 + 防重放）与清理
//! 3. 可移植的存储 key 派生
//! 4. 多存储后端支持：内存, SQLite, Redis
//!
//! 所有写操作都经过基于版本号的原子读改写，并发写者之间不会丢失更新。

pub mod association;
pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod nonce;
pub mod storage;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use association::AssociationStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use key::{association_key, association_prefix, nonce_key};
pub use nonce::NonceStore;
pub use storage::{RecordStorage, StorageBackend, StorageConfig};
pub use store::OpenIdStore;
pub use types::{Association, CleanupReport, StoreStats};

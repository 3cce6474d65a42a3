//! 记录存储模块
//!
//! 提供多种存储后端支持：内存, SQLite, Redis
//!
//! # 设计
//!
//! - `RecordBackend` trait 定义统一的异步接口
//! - `RecordStorage` enum 封装不同的后端实现
//! - `KeyedRecordStore` 在后端之上提供快照缓存与原子读改写
//! - 通过 `StorageConfig` 配置选择和初始化后端

pub mod backend;
pub mod config;
pub mod memory;
pub mod record_store;
pub mod sqlite;

#[cfg(feature = "backend-redis")]
pub mod redis;

use crate::error::{StoreError, StoreResult};
use crate::types::{Records, Snapshot};

pub use backend::RecordBackend;
pub use config::{RedisConfig, SqliteConfig, StorageBackend, StorageConfig};
pub use memory::MemoryBackend;
pub use record_store::{KeyedRecordStore, Update};
pub use sqlite::SqliteBackend;

#[cfg(feature = "backend-redis")]
pub use self::redis::RedisBackend;

/// 记录存储统一接口
#[derive(Clone, Debug)]
pub enum RecordStorage {
    /// 内存存储后端
    Memory(MemoryBackend),

    /// SQLite 存储后端（始终可用）
    Sqlite(Box<SqliteBackend>),

    /// Redis 存储后端
    #[cfg(feature = "backend-redis")]
    Redis(RedisBackend),
}

impl RecordStorage {
    /// 从配置创建存储实例
    ///
    /// # Errors
    /// - 缺少对应后端的配置
    /// - 后端初始化失败
    /// - 后端功能未启用（feature flag）
    pub async fn from_config(config: &StorageConfig) -> StoreResult<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(Self::Memory(MemoryBackend::new())),

            StorageBackend::Sqlite => {
                let cfg = config
                    .sqlite
                    .as_ref()
                    .ok_or_else(|| StoreError::Config("Missing SQLite config".into()))?;
                let backend = SqliteBackend::new(cfg).await?;
                Ok(Self::Sqlite(Box::new(backend)))
            }

            #[cfg(feature = "backend-redis")]
            StorageBackend::Redis => {
                let cfg = config
                    .redis
                    .as_ref()
                    .ok_or_else(|| StoreError::Config("Missing Redis config".into()))?;
                let backend = RedisBackend::new(cfg).await?;
                Ok(Self::Redis(backend))
            }

            #[cfg(not(feature = "backend-redis"))]
            StorageBackend::Redis => Err(StoreError::Config(
                "Redis backend not enabled. Compile with --features backend-redis".into(),
            )),
        }
    }

    fn backend(&self) -> &dyn RecordBackend {
        match self {
            Self::Memory(b) => b,
            Self::Sqlite(b) => b.as_ref(),

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b,
        }
    }

    /// 读取整个 blob
    pub async fn load(&self, name: &str) -> StoreResult<Snapshot> {
        self.backend().load(name).await
    }

    /// 版本匹配时写入
    pub async fn compare_and_swap(
        &self,
        name: &str,
        expected_version: u64,
        records: &Records,
    ) -> StoreResult<bool> {
        self.backend()
            .compare_and_swap(name, expected_version, records)
            .await
    }

    /// 无条件覆盖
    pub async fn overwrite(&self, name: &str, records: &Records) -> StoreResult<()> {
        self.backend().overwrite(name, records).await
    }

    /// 获取后端类型名称
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "Memory",
            Self::Sqlite(_) => "SQLite",

            #[cfg(feature = "backend-redis")]
            Self::Redis(_) => "Redis",
        }
    }
}

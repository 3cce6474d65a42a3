//! 存储服务配置

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::{StorageBackend, StorageConfig};

/// association / nonce 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 后端存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// nonce 时间戳允许的最大时钟偏差（秒）
    ///
    /// 超出该窗口的 nonce 直接拒绝，清理时也会被删除
    #[serde(default = "default_nonce_skew_secs")]
    pub nonce_skew_secs: i64,

    /// 乐观并发写入冲突时的最大尝试次数
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,

    /// 只读查询缓存快照的秒数，0 表示不缓存
    ///
    /// 写操作总会先丢弃缓存再读取最新状态。多个实例共享同一后端时，
    /// 其他实例的写入在缓存过期前对 `get` 不可见
    #[serde(default)]
    pub read_cache_ttl_secs: u64,

    /// 保存 association 的 blob 名称
    #[serde(default = "default_associations_option")]
    pub associations_option: String,

    /// 保存 nonce 的 blob 名称
    #[serde(default = "default_nonces_option")]
    pub nonces_option: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            nonce_skew_secs: default_nonce_skew_secs(),
            max_update_attempts: default_max_update_attempts(),
            read_cache_ttl_secs: 0,
            associations_option: default_associations_option(),
            nonces_option: default_nonces_option(),
        }
    }
}

fn default_nonce_skew_secs() -> i64 {
    60 * 60 * 5
}

fn default_max_update_attempts() -> u32 {
    8
}

fn default_associations_option() -> String {
    "liberatid_associations".to_string()
}

fn default_nonces_option() -> String {
    "liberatid_nonces".to_string()
}

impl StoreConfig {
    /// 内存后端的默认配置
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig::memory(),
            ..Default::default()
        }
    }

    /// 只读查询的缓存存活时间
    pub fn read_cache_ttl(&self) -> Option<Duration> {
        (self.read_cache_ttl_secs > 0).then(|| Duration::from_secs(self.read_cache_ttl_secs))
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.nonce_skew_secs <= 0 {
            errors.push(format!(
                "Invalid nonce_skew_secs {}, must be positive",
                self.nonce_skew_secs
            ));
        }

        if self.max_update_attempts == 0 {
            errors.push("max_update_attempts must be at least 1".to_string());
        }

        if self.associations_option.trim().is_empty() || self.nonces_option.trim().is_empty() {
            errors.push("Option names cannot be empty".to_string());
        } else if self.associations_option == self.nonces_option {
            errors.push(format!(
                "associations_option and nonces_option must differ (both '{}')",
                self.nonces_option
            ));
        }

        match self.storage.backend {
            StorageBackend::Memory => {}
            StorageBackend::Sqlite => match &self.storage.sqlite {
                None => errors.push("Missing [storage.sqlite] config".to_string()),
                Some(sqlite) if sqlite.path.trim().is_empty() => {
                    errors.push("storage.sqlite.path cannot be empty".to_string())
                }
                Some(_) => {}
            },
            StorageBackend::Redis => {
                if self.storage.redis.is_none() {
                    errors.push("Missing [storage.redis] config".to_string());
                }
                if !cfg!(feature = "backend-redis") {
                    errors.push(
                        "Redis backend not enabled. Compile with --features backend-redis"
                            .to_string(),
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

//! 存储错误定义

use thiserror::Error;

/// 存储层错误类型
///
/// 记录缺失（查询未命中、删除不存在的 key）不是错误，通过 `Ok(None)` / `Ok(false)` 表达
#[derive(Error, Debug)]
pub enum StoreError {
    /// server URL 缺少 `scheme://` 分隔符，无法派生 key
    #[error("Malformed server URL: {0}")]
    MalformedUrl(String),

    /// nonce 时间戳为负数，无法派生按时间排序的 key
    #[error("Invalid nonce timestamp: {0}")]
    InvalidTimestamp(i64),

    /// 存储的记录无法反序列化
    #[error("Corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// 乐观并发写入在重试次数内始终冲突
    #[error("Concurrent update conflict on '{name}' after {attempts} attempts")]
    Conflict { name: String, attempts: u32 },

    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis 错误
    #[cfg(feature = "backend-redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// 是否为调用方可以按“操作失败”处理的输入错误
    pub fn is_malformed_url(&self) -> bool {
        matches!(self, Self::MalformedUrl(_))
    }
}

/// 存储结果类型别名
pub type StoreResult<T> = Result<T, StoreError>;

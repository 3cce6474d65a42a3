//! 存储后端配置
//!
//! 定义各种存储后端的配置结构

use serde::{Deserialize, Serialize};

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储后端类型
    pub backend: StorageBackend,

    /// SQLite 配置（当 backend = "sqlite" 时必需）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteConfig>,

    /// Redis 配置（当 backend = "redis" 时必需）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite: Some(SqliteConfig::default()),
            redis: None,
        }
    }
}

impl StorageConfig {
    /// 仅驻留内存的配置，进程退出即丢失
    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite: None,
            redis: None,
        }
    }
}

/// 存储后端类型枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// 进程内存
    Memory,
    /// SQLite 数据库
    Sqlite,
    /// Redis 内存数据库
    Redis,
}

/// SQLite 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// 数据库文件路径
    pub path: String,

    /// 连接池大小
    #[serde(default = "default_sqlite_max_connections")]
    pub max_connections: u32,

    /// 数据库锁等待超时（秒）
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "data/liberatid.db".to_string(),
            max_connections: default_sqlite_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

fn default_sqlite_max_connections() -> u32 {
    10
}

fn default_busy_timeout_secs() -> u64 {
    5
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis 连接 URL
    ///
    /// 格式：redis://[username:password@]host[:port][/database]
    /// 示例：redis://localhost:6379/0
    pub url: String,

    /// 连接池大小
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// key 前缀，用于在同一个 Redis 库中隔离多个实例
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool_size: default_redis_pool_size(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_pool_size() -> usize {
    20
}

fn default_key_prefix() -> String {
    "liberatid:".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_storage_config() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Sqlite);
        assert!(config.sqlite.is_some());
        assert!(config.redis.is_none());
    }

    #[test]
    fn test_serialize_sqlite_config() {
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            sqlite: Some(SqliteConfig {
                path: "test.db".to_string(),
                ..Default::default()
            }),
            redis: None,
        };

        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("backend = \"sqlite\""));
        assert!(toml.contains("path = \"test.db\""));
        assert!(!toml.contains("[redis]"));
    }

    #[test]
    fn test_deserialize_redis_config() {
        let toml_str = r#"
            backend = "redis"

            [redis]
            url = "redis://localhost:6379/1"
            pool_size = 30
        "#;

        let config: StorageConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend, StorageBackend::Redis);

        let redis = config.redis.unwrap();
        assert_eq!(redis.url, "redis://localhost:6379/1");
        assert_eq!(redis.pool_size, 30);
        assert_eq!(redis.key_prefix, "liberatid:");
    }
}

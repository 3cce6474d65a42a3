//! Redis 存储后端实现
//!
//! 使用 Redis 提供多实例共享的存储支持

use crate::error::{StoreError, StoreResult};
use crate::storage::backend::RecordBackend;
use crate::storage::config::RedisConfig;
use crate::types::{Records, Snapshot};
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::Script;
use tracing::{debug, info};

/// 版本号匹配时才写入，返回 1 表示成功
const CAS_SCRIPT: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'version') or '0')
if current ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('HSET', KEYS[1], 'value', ARGV[2], 'version', current + 1)
return 1
"#;

/// Redis 存储后端
///
/// 数据结构设计：
/// - {prefix}{name} -> Hash {value: JSON 映射, version: 版本号}
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    key_prefix: String,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisBackend {
    /// 创建新的 Redis 后端实例
    pub async fn new(config: &RedisConfig) -> StoreResult<Self> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Internal(format!("Failed to create Redis pool: {e}")))?;

        let backend = Self {
            pool,
            key_prefix: config.key_prefix.clone(),
        };
        backend.init().await?;

        info!(
            "Redis record storage initialized: url={}, prefix={}",
            config.url, config.key_prefix
        );

        Ok(backend)
    }

    async fn connection(&self) -> StoreResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Internal(format!("Failed to get Redis connection: {e}")))
    }

    fn hash_key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }
}

#[async_trait]
impl RecordBackend for RedisBackend {
    async fn init(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await?;

        debug!("Redis backend initialized (no schema needed)");
        Ok(())
    }

    async fn load(&self, name: &str) -> StoreResult<Snapshot> {
        let mut conn = self.connection().await?;

        let (value, version): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(self.hash_key(name))
            .arg("value")
            .arg("version")
            .query_async(&mut *conn)
            .await?;

        match (value, version) {
            (Some(value), Some(version)) => {
                let records: Records = serde_json::from_str(&value)?;
                Ok(Snapshot::new(records, version))
            }
            _ => Ok(Snapshot::default()),
        }
    }

    async fn compare_and_swap(
        &self,
        name: &str,
        expected_version: u64,
        records: &Records,
    ) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let value = serde_json::to_string(records)?;

        let swapped: i64 = Script::new(CAS_SCRIPT)
            .key(self.hash_key(name))
            .arg(expected_version)
            .arg(value)
            .invoke_async(&mut *conn)
            .await?;

        Ok(swapped == 1)
    }

    async fn overwrite(&self, name: &str, records: &Records) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let key = self.hash_key(name);

        let _: () = redis::pipe()
            .atomic()
            .hset(&key, "value", serde_json::to_string(records)?)
            .ignore()
            .hincr(&key, "version", 1)
            .ignore()
            .query_async(&mut *conn)
            .await?;

        Ok(())
    }
}

//! SQLite 存储后端实现
//!
//! 使用 sqlx 提供原生异步 SQLite 存储支持。所有 blob 保存在同一张
//! `options` 表中，每行对应一个命名 blob，内容为 JSON 编码的映射。
//!
//! 表结构修订号记录在 `PRAGMA user_version` 中，打开时检查：
//! 旧修订号就地升级，比当前程序更新的修订号拒绝打开。

use crate::error::{StoreError, StoreResult};
use crate::storage::backend::RecordBackend;
use crate::storage::config::SqliteConfig;
use crate::types::{Records, Snapshot};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace};

/// 当前 `options` 表结构的修订号
pub const SCHEMA_REVISION: i64 = 1;

/// SQLite 存储后端
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    path: String,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteBackend {
    /// 创建新的 SQLite 后端实例
    ///
    /// # Arguments
    /// * `config` - SQLite 配置，`path` 为数据库文件路径，父目录不存在时自动创建
    pub async fn new(config: &SqliteConfig) -> StoreResult<Self> {
        let file = Path::new(&config.path);
        if let Some(parent) = file.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Internal(format!(
                    "Failed to create SQLite directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        // 创建连接选项并启用 WAL 模式
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", file.display()))
            .map_err(|e| StoreError::Internal(format!("Failed to parse SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        // 创建连接池
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let backend = Self {
            pool,
            path: config.path.clone(),
        };

        // 初始化数据库表
        backend.init().await?;

        info!(
            "SQLite record storage initialized with sqlx: path={}, WAL mode enabled",
            backend.path
        );

        Ok(backend)
    }

    fn encode(records: &Records) -> StoreResult<String> {
        Ok(serde_json::to_string(records)?)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[async_trait]
impl RecordBackend for SqliteBackend {
    async fn init(&self) -> StoreResult<()> {
        let revision: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        if revision > SCHEMA_REVISION {
            return Err(StoreError::Config(format!(
                "SQLite schema revision {revision} at {} is newer than supported revision {SCHEMA_REVISION}",
                self.path
            )));
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS options (
                name TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        if revision < SCHEMA_REVISION {
            sqlx::query(&format!("PRAGMA user_version = {SCHEMA_REVISION}"))
                .execute(&self.pool)
                .await?;
            info!(
                "SQLite schema upgraded from revision {} to {}",
                revision, SCHEMA_REVISION
            );
        }

        debug!("SQLite options table initialized");
        Ok(())
    }

    async fn load(&self, name: &str) -> StoreResult<Snapshot> {
        let row = sqlx::query_as::<_, (String, i64)>(
            "SELECT value, version FROM options WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((value, version)) => {
                trace!("Loaded option '{}' at version {}", name, version);
                let records: Records = serde_json::from_str(&value)?;
                Ok(Snapshot::new(records, version as u64))
            }
            None => {
                trace!("Option '{}' not found", name);
                Ok(Snapshot::default())
            }
        }
    }

    async fn compare_and_swap(
        &self,
        name: &str,
        expected_version: u64,
        records: &Records,
    ) -> StoreResult<bool> {
        let value = Self::encode(records)?;

        let result = if expected_version == 0 {
            sqlx::query(
                r#"INSERT INTO options (name, value, version, updated_at)
                   VALUES (?1, ?2, 1, ?3)
                   ON CONFLICT(name) DO NOTHING"#,
            )
            .bind(name)
            .bind(&value)
            .bind(Self::now())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"UPDATE options SET value = ?1, version = version + 1, updated_at = ?2
                   WHERE name = ?3 AND version = ?4"#,
            )
            .bind(&value)
            .bind(Self::now())
            .bind(name)
            .bind(expected_version as i64)
            .execute(&self.pool)
            .await?
        };

        let swapped = result.rows_affected() == 1;
        if !swapped {
            debug!(
                "Version conflict on option '{}' (expected {})",
                name, expected_version
            );
        }
        Ok(swapped)
    }

    async fn overwrite(&self, name: &str, records: &Records) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO options (name, value, version, updated_at)
               VALUES (?1, ?2, 1, ?3)
               ON CONFLICT(name) DO UPDATE SET
                   value = excluded.value,
                   version = options.version + 1,
                   updated_at = excluded.updated_at"#,
        )
        .bind(name)
        .bind(Self::encode(records)?)
        .bind(Self::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

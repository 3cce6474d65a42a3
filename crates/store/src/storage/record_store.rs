//! 键值记录存储
//!
//! 在 `RecordStorage` 之上提供：
//! - 命名 blob 的快照缓存（有限存活时间，默认关闭），以及显式的 `invalidate`
//! - 基于版本号的原子读改写 `update`：丢弃缓存、读取最新快照、修改、
//!   按读取时的版本 compare-and-swap，冲突时重试
//!
//! 并发写者之间不会丢失更新；超过重试次数返回 `StoreError::Conflict`。

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{StoreError, StoreResult};
use crate::storage::RecordStorage;
use crate::types::{Records, Snapshot};

/// `update` 闭包的返回值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<T> {
    /// 提交修改后的映射
    Commit(T),
    /// 不写入，映射必须保持未修改
    Skip(T),
}

/// 带缓存的键值记录存储
#[derive(Debug)]
pub struct KeyedRecordStore {
    storage: RecordStorage,
    cache: RwLock<HashMap<String, (Instant, Snapshot)>>,
    cache_ttl: Option<Duration>,
    max_attempts: u32,
}

impl KeyedRecordStore {
    /// # Arguments
    /// * `storage` - 后端存储
    /// * `max_attempts` - `update` 的最大尝试次数，最少 1 次
    /// * `cache_ttl` - 只读查询缓存快照的存活时间，`None` 表示每次都读后端
    pub fn new(storage: RecordStorage, max_attempts: u32, cache_ttl: Option<Duration>) -> Self {
        Self {
            storage,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: cache_ttl.filter(|ttl| !ttl.is_zero()),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.storage.backend_name()
    }

    /// 丢弃 `name` 的缓存快照，下一次读取将访问后端
    pub async fn invalidate(&self, name: &str) {
        self.cache.write().await.remove(name);
    }

    async fn remember(&self, name: &str, snapshot: Snapshot) {
        if self.cache_ttl.is_some() {
            self.cache
                .write()
                .await
                .insert(name.to_string(), (Instant::now(), snapshot));
        }
    }

    /// 读取快照，缓存未过期时直接返回缓存
    ///
    /// 其他实例的写入最多在 `cache_ttl` 之后可见
    pub async fn read(&self, name: &str) -> StoreResult<Snapshot> {
        if let Some(ttl) = self.cache_ttl
            && let Some((cached_at, snapshot)) = self.cache.read().await.get(name)
            && cached_at.elapsed() < ttl
        {
            trace!("Cache hit for '{}' at version {}", name, snapshot.version);
            return Ok(snapshot.clone());
        }

        let snapshot = self.storage.load(name).await?;
        self.remember(name, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// 丢弃缓存后读取最新快照
    pub async fn read_fresh(&self, name: &str) -> StoreResult<Snapshot> {
        self.invalidate(name).await;
        self.read(name).await
    }

    /// 原子读改写
    ///
    /// `f` 可能被调用多次（每次冲突重试一次），每次拿到的都是最新快照。
    pub async fn update<T, F>(&self, name: &str, mut f: F) -> StoreResult<T>
    where
        F: FnMut(&mut Records) -> Update<T> + Send,
        T: Send,
    {
        for attempt in 1..=self.max_attempts {
            self.invalidate(name).await;
            let Snapshot {
                mut records,
                version,
            } = self.storage.load(name).await?;

            let value = match f(&mut records) {
                Update::Skip(value) => return Ok(value),
                Update::Commit(value) => value,
            };

            if self
                .storage
                .compare_and_swap(name, version, &records)
                .await?
            {
                trace!("Committed '{}' at version {}", name, version + 1);
                self.remember(name, Snapshot::new(records, version + 1))
                    .await;
                return Ok(value);
            }

            debug!(
                "Concurrent update on '{}' (attempt {}/{}), retrying",
                name, attempt, self.max_attempts
            );
            tokio::task::yield_now().await;
        }

        self.invalidate(name).await;
        warn!(
            "Giving up update of '{}' after {} conflicting attempts",
            name, self.max_attempts
        );
        Err(StoreError::Conflict {
            name: name.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// 无条件替换整个 blob
    pub async fn replace(&self, name: &str, records: Records) -> StoreResult<()> {
        self.invalidate(name).await;
        self.storage.overwrite(name, &records).await
    }
}

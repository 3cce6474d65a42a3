//! Association 存储
//!
//! 以 `association_key(server_url, handle)` 为 key，把序列化后的 association
//! 保存在单个命名 blob 中。未指定 handle 时按 key 前缀扫描，
//! 返回同一 server URL 下最近签发的 association。

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::StoreResult;
use crate::key::{association_key, association_prefix};
use crate::storage::{KeyedRecordStore, Update};
use crate::types::{Association, Records};

/// Association 存储
#[derive(Debug, Clone)]
pub struct AssociationStore {
    records: Arc<KeyedRecordStore>,
    clock: Arc<dyn Clock>,
    option: String,
}

impl AssociationStore {
    pub fn new(
        records: Arc<KeyedRecordStore>,
        clock: Arc<dyn Clock>,
        option: impl Into<String>,
    ) -> Self {
        Self {
            records,
            clock,
            option: option.into(),
        }
    }

    /// 保存 association，同一 `(server_url, handle)` 的旧记录被覆盖
    pub async fn store(&self, server_url: &str, association: &Association) -> StoreResult<()> {
        let key = association_key(server_url, &association.handle)?;
        let serialized = association.serialize();

        self.records
            .update(&self.option, |records| {
                records.insert(key.clone(), serialized.clone());
                Update::Commit(())
            })
            .await?;

        debug!(
            "Stored association for {} (handle={})",
            server_url, association.handle
        );
        Ok(())
    }

    /// 查询 association
    ///
    /// # Arguments
    /// * `handle` - `None` 或空串时返回该 server URL 下 `issued` 最大的 association，
    ///   相同时取 key 较大者
    ///
    /// # Returns
    /// * `Ok(None)` - 不存在
    /// * `Err(CorruptRecord)` - 指定 handle 的记录无法解析
    pub async fn get(
        &self,
        server_url: &str,
        handle: Option<&str>,
    ) -> StoreResult<Option<Association>> {
        let snapshot = self.records.read(&self.option).await?;

        match handle.filter(|h| !h.is_empty()) {
            Some(handle) => {
                let key = association_key(server_url, handle)?;
                match snapshot.records.get(&key) {
                    Some(data) => Association::deserialize(&key, data).map(Some),
                    None => {
                        debug!("No association for {} (handle={})", server_url, handle);
                        Ok(None)
                    }
                }
            }
            None => most_recent(&snapshot.records, &association_prefix(server_url)?),
        }
    }

    /// 删除 association
    ///
    /// 是否存在由原子更新读取到的最新快照决定，不经过读缓存。
    /// 无法解析的记录同样视为存在并删除。
    ///
    /// # Returns
    /// * `Ok(true)` - 记录存在并已删除
    /// * `Ok(false)` - 记录不存在
    pub async fn remove(&self, server_url: &str, handle: &str) -> StoreResult<bool> {
        let key = association_key(server_url, handle)?;

        let removed = self
            .records
            .update(&self.option, |records| match records.remove(&key) {
                Some(data) => {
                    if let Err(e) = Association::deserialize(&key, &data) {
                        warn!("Removing corrupt association: {}", e);
                    }
                    Update::Commit(true)
                }
                None => Update::Skip(false),
            })
            .await?;

        if removed {
            debug!("Removed association for {} (handle={})", server_url, handle);
        }
        Ok(removed)
    }

    /// 清理过期（`expires_in <= 0`）以及无法解析的 association
    ///
    /// # Returns
    /// 被清理的数量
    pub async fn cleanup_expired(&self) -> StoreResult<usize> {
        let now = self.clock.now();

        let removed = self
            .records
            .update(&self.option, |records| {
                let before = records.len();
                records.retain(|key, data| match Association::deserialize(key, data) {
                    Ok(association) => !association.is_expired(now),
                    Err(e) => {
                        warn!("Dropping unreadable association: {}", e);
                        false
                    }
                });

                match before - records.len() {
                    0 => Update::Skip(0),
                    n => Update::Commit(n),
                }
            })
            .await?;

        if removed > 0 {
            info!("Cleaned up {} expired associations", removed);
        }
        Ok(removed)
    }

    /// 清空所有 association
    pub async fn reset(&self) -> StoreResult<()> {
        self.records.replace(&self.option, Records::new()).await?;
        info!("All associations cleared");
        Ok(())
    }

    /// 当前保存的 association 数量
    pub async fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read_fresh(&self.option).await?.records.len())
    }
}

/// 在前缀匹配的记录中选出 `issued` 最大者，损坏的记录跳过
fn most_recent(records: &Records, prefix: &str) -> StoreResult<Option<Association>> {
    let best = records
        .range::<str, _>((
            std::ops::Bound::Included(prefix),
            std::ops::Bound::Unbounded,
        ))
        .take_while(|(key, _)| key.starts_with(prefix))
        .filter_map(|(key, data)| match Association::deserialize(key, data) {
            Ok(association) => Some((key, association)),
            Err(e) => {
                warn!("Skipping unreadable association: {}", e);
                None
            }
        })
        .max_by(|(key_a, a), (key_b, b)| match a.issued.cmp(&b.issued) {
            Ordering::Equal => key_a.cmp(key_b),
            other => other,
        });

    Ok(best.map(|(_, association)| association))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::storage::{MemoryBackend, RecordStorage};
    use std::time::Duration;

    const URL: &str = "https://provider.example/op";

    fn store_on(
        backend: &MemoryBackend,
        clock: Arc<ManualClock>,
        cache_ttl: Option<Duration>,
    ) -> AssociationStore {
        let records = Arc::new(KeyedRecordStore::new(
            RecordStorage::Memory(backend.clone()),
            8,
            cache_ttl,
        ));
        AssociationStore::new(records, clock, "liberatid_associations")
    }

    fn create_store(now: i64) -> (Arc<ManualClock>, AssociationStore) {
        let clock = ManualClock::new(now);
        let store = store_on(&MemoryBackend::new(), clock.clone(), None);
        (clock, store)
    }

    fn assoc(handle: &str, issued: i64, lifetime: i64) -> Association {
        Association::new(handle, b"secret".to_vec(), issued, lifetime, "HMAC-SHA1")
    }

    #[tokio::test]
    async fn test_store_and_get_by_handle() {
        let (_clock, store) = create_store(1000);
        let a = assoc("h1", 1000, 3600);

        store.store(URL, &a).await.unwrap();
        assert_eq!(store.get(URL, Some("h1")).await.unwrap(), Some(a));
        assert_eq!(store.get(URL, Some("h2")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_overwrites_same_handle() {
        let (_clock, store) = create_store(1000);
        store.store(URL, &assoc("h1", 1000, 60)).await.unwrap();
        store.store(URL, &assoc("h1", 2000, 60)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let found = store.get(URL, Some("h1")).await.unwrap().unwrap();
        assert_eq!(found.issued, 2000);
    }

    #[tokio::test]
    async fn test_get_without_handle_returns_most_recent() {
        let (_clock, store) = create_store(1000);
        store.store(URL, &assoc("old", 100, 3600)).await.unwrap();
        store.store(URL, &assoc("newest", 300, 3600)).await.unwrap();
        store.store(URL, &assoc("middle", 200, 3600)).await.unwrap();
        // 其他 server 的记录不参与
        store
            .store("https://other.example/op", &assoc("other", 999, 3600))
            .await
            .unwrap();

        let found = store.get(URL, None).await.unwrap().unwrap();
        assert_eq!(found.handle, "newest");

        let found = store.get(URL, Some("")).await.unwrap().unwrap();
        assert_eq!(found.handle, "newest");
    }

    #[tokio::test]
    async fn test_most_recent_tie_breaks_on_key_descending() {
        let (_clock, store) = create_store(1000);
        store.store(URL, &assoc("a", 500, 3600)).await.unwrap();
        store.store(URL, &assoc("b", 500, 3600)).await.unwrap();

        let key_a = association_key(URL, "a").unwrap();
        let key_b = association_key(URL, "b").unwrap();
        let expected = if key_a > key_b { "a" } else { "b" };

        let found = store.get(URL, None).await.unwrap().unwrap();
        assert_eq!(found.handle, expected);
    }

    #[tokio::test]
    async fn test_get_without_handle_on_empty_store() {
        let (_clock, store) = create_store(1000);
        assert_eq!(store.get(URL, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_clock, store) = create_store(1000);
        assert!(!store.remove(URL, "h1").await.unwrap());

        store.store(URL, &assoc("h1", 1000, 3600)).await.unwrap();
        assert!(store.remove(URL, "h1").await.unwrap());
        assert!(!store.remove(URL, "h1").await.unwrap());
        assert_eq!(store.get(URL, Some("h1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_instances_sharing_a_backend_see_each_other() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(1000);
        let a = store_on(&backend, clock.clone(), None);
        let b = store_on(&backend, clock, None);

        assert_eq!(b.get(URL, None).await.unwrap(), None);
        a.store(URL, &assoc("h1", 1000, 3600)).await.unwrap();

        assert_eq!(b.get(URL, Some("h1")).await.unwrap().unwrap().handle, "h1");
        assert_eq!(b.get(URL, None).await.unwrap().unwrap().handle, "h1");
        assert!(b.remove(URL, "h1").await.unwrap());
        assert_eq!(a.get(URL, Some("h1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_ignores_stale_read_cache() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(1000);
        let a = store_on(&backend, clock.clone(), None);
        let b = store_on(&backend, clock, Some(Duration::from_secs(3600)));

        // b 缓存了空快照
        assert_eq!(b.get(URL, Some("h1")).await.unwrap(), None);
        a.store(URL, &assoc("h1", 1000, 3600)).await.unwrap();

        assert!(b.remove(URL, "h1").await.unwrap());
        assert_eq!(a.get(URL, Some("h1")).await.unwrap(), None);
        assert!(!b.remove(URL, "h1").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let (clock, store) = create_store(1000);
        store.store(URL, &assoc("short", 1000, 100)).await.unwrap();
        store.store(URL, &assoc("long", 1000, 10_000)).await.unwrap();

        clock.set(1100);
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert_eq!(store.get(URL, Some("short")).await.unwrap(), None);
        assert!(store.get(URL, Some("long")).await.unwrap().is_some());

        // 没有可清理的记录时不写入
        assert_eq!(store.cleanup_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_records() {
        let (_clock, store) = create_store(1000);
        store.store(URL, &assoc("good", 100, 3600)).await.unwrap();

        let bad_key = association_key(URL, "bad").unwrap();
        store
            .records
            .update("liberatid_associations", |records| {
                records.insert(bad_key.clone(), "not an association".into());
                Update::Commit(())
            })
            .await
            .unwrap();

        // 精确查询返回错误，扫描时跳过
        let err = store.get(URL, Some("bad")).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
        assert_eq!(store.get(URL, None).await.unwrap().unwrap().handle, "good");

        // 损坏的记录可以被删除
        assert!(store.remove(URL, "bad").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_drops_corrupt_records() {
        let (_clock, store) = create_store(1000);
        store
            .records
            .update("liberatid_associations", |records| {
                records.insert("garbage".into(), "???".into());
                Update::Commit(())
            })
            .await
            .unwrap();

        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_url() {
        let (_clock, store) = create_store(1000);
        let err = store.store("not-a-url", &assoc("h", 1, 1)).await.unwrap_err();
        assert!(err.is_malformed_url());
        assert!(store.get("not-a-url", None).await.unwrap_err().is_malformed_url());
    }

    #[tokio::test]
    async fn test_reset() {
        let (_clock, store) = create_store(1000);
        store.store(URL, &assoc("h1", 1000, 3600)).await.unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.get(URL, None).await.unwrap(), None);
    }
}

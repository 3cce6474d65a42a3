//! OpenID 存储门面
//!
//! 把 association 存储与 nonce 存储组合在同一个后端之上，
//! 对外提供 relying party 需要的完整操作集合。

use std::sync::Arc;

use tracing::info;

use crate::association::AssociationStore;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::nonce::NonceStore;
use crate::storage::{KeyedRecordStore, RecordStorage};
use crate::types::{Association, CleanupReport, StoreStats};

/// association 与 nonce 的统一存储
#[derive(Debug, Clone)]
pub struct OpenIdStore {
    records: Arc<KeyedRecordStore>,
    associations: AssociationStore,
    nonces: NonceStore,
}

impl OpenIdStore {
    /// 按配置创建存储，使用系统时钟
    pub async fn new(config: &StoreConfig) -> StoreResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// 按配置创建存储，使用指定时钟
    ///
    /// # Errors
    /// - 配置校验失败
    /// - 后端初始化失败
    pub async fn with_clock(config: &StoreConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        config
            .validate()
            .map_err(|errors| StoreError::Config(errors.join("; ")))?;

        let storage = RecordStorage::from_config(&config.storage).await?;
        Ok(Self::from_storage(storage, config, clock))
    }

    /// 在已创建的后端之上组装存储
    pub fn from_storage(
        storage: RecordStorage,
        config: &StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let records = Arc::new(KeyedRecordStore::new(
            storage,
            config.max_update_attempts,
            config.read_cache_ttl(),
        ));

        let associations =
            AssociationStore::new(records.clone(), clock.clone(), &config.associations_option);
        let nonces = NonceStore::new(
            records.clone(),
            clock,
            &config.nonces_option,
            config.nonce_skew_secs,
        );

        info!(
            "OpenID store ready (backend={}, nonce skew={}s)",
            records.backend_name(),
            config.nonce_skew_secs
        );

        Self {
            records,
            associations,
            nonces,
        }
    }

    pub fn associations(&self) -> &AssociationStore {
        &self.associations
    }

    pub fn nonces(&self) -> &NonceStore {
        &self.nonces
    }

    pub fn backend_name(&self) -> &'static str {
        self.records.backend_name()
    }

    pub async fn store_association(
        &self,
        server_url: &str,
        association: &Association,
    ) -> StoreResult<()> {
        self.associations.store(server_url, association).await
    }

    pub async fn get_association(
        &self,
        server_url: &str,
        handle: Option<&str>,
    ) -> StoreResult<Option<Association>> {
        self.associations.get(server_url, handle).await
    }

    pub async fn remove_association(&self, server_url: &str, handle: &str) -> StoreResult<bool> {
        self.associations.remove(server_url, handle).await
    }

    pub async fn use_nonce(
        &self,
        server_url: &str,
        timestamp: i64,
        salt: &str,
    ) -> StoreResult<bool> {
        self.nonces.use_nonce(server_url, timestamp, salt).await
    }

    pub async fn cleanup_nonces(&self) -> StoreResult<usize> {
        self.nonces.cleanup_expired().await
    }

    pub async fn cleanup_associations(&self) -> StoreResult<usize> {
        self.associations.cleanup_expired().await
    }

    /// 一次完整清理：先 nonce 后 association
    pub async fn cleanup(&self) -> StoreResult<CleanupReport> {
        let nonces_removed = self.cleanup_nonces().await?;
        let associations_removed = self.cleanup_associations().await?;
        Ok(CleanupReport {
            associations_removed,
            nonces_removed,
        })
    }

    /// 清空全部 association 与 nonce
    pub async fn reset(&self) -> StoreResult<()> {
        self.associations.reset().await?;
        self.nonces.reset().await
    }

    pub async fn stats(&self) -> StoreResult<StoreStats> {
        Ok(StoreStats {
            backend: self.backend_name(),
            associations: self.associations.count().await?,
            nonces: self.nonces.count().await?,
        })
    }
}

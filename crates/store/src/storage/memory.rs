//! 内存存储后端实现

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreResult;
use crate::storage::backend::RecordBackend;
use crate::types::{Records, Snapshot};

/// 进程内存储后端
///
/// 克隆后的实例共享同一份数据
#[derive(Clone, Default)]
pub struct MemoryBackend {
    pub(crate) blobs: Arc<Mutex<HashMap<String, Snapshot>>>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordBackend for MemoryBackend {
    async fn init(&self) -> StoreResult<()> {
        debug!("Memory backend initialized (no schema needed)");
        Ok(())
    }

    async fn load(&self, name: &str) -> StoreResult<Snapshot> {
        let blobs = self.blobs.lock().await;
        Ok(blobs.get(name).cloned().unwrap_or_default())
    }

    async fn compare_and_swap(
        &self,
        name: &str,
        expected_version: u64,
        records: &Records,
    ) -> StoreResult<bool> {
        let mut blobs = self.blobs.lock().await;
        let current = blobs.get(name).map(|s| s.version).unwrap_or(0);
        if current != expected_version {
            return Ok(false);
        }

        blobs.insert(
            name.to_string(),
            Snapshot::new(records.clone(), expected_version + 1),
        );
        Ok(true)
    }

    async fn overwrite(&self, name: &str, records: &Records) -> StoreResult<()> {
        let mut blobs = self.blobs.lock().await;
        let version = blobs.get(name).map(|s| s.version).unwrap_or(0) + 1;
        blobs.insert(name.to_string(), Snapshot::new(records.clone(), version));
        Ok(())
    }
}

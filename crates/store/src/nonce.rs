//! Nonce 存储
//!
//! 记录已使用的 `(server_url, timestamp, salt)`，每个组合只接受一次，用于防止
//! provider 响应被重放。时间戳与当前时间相差超过 skew 的 nonce 一律拒绝，
//! 因此超出窗口的记录可以安全清理。负数时间戳同样视为超出窗口。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::StoreResult;
use crate::key::nonce_key;
use crate::storage::{KeyedRecordStore, Update};
use crate::types::Records;

/// Nonce 存储
#[derive(Debug, Clone)]
pub struct NonceStore {
    records: Arc<KeyedRecordStore>,
    clock: Arc<dyn Clock>,
    option: String,
    skew: i64,
}

impl NonceStore {
    /// # Arguments
    /// * `skew` - 允许的最大时钟偏差（秒）
    pub fn new(
        records: Arc<KeyedRecordStore>,
        clock: Arc<dyn Clock>,
        option: impl Into<String>,
        skew: i64,
    ) -> Self {
        Self {
            records,
            clock,
            option: option.into(),
            skew,
        }
    }

    pub fn skew(&self) -> i64 {
        self.skew
    }

    fn is_fresh(&self, timestamp: i64, now: i64) -> bool {
        timestamp >= 0
            && u64::try_from(self.skew).is_ok_and(|skew| timestamp.abs_diff(now) <= skew)
    }

    /// 使用 nonce
    ///
    /// # Returns
    /// * `Ok(true)` - 首次使用，已记录
    /// * `Ok(false)` - 超出时间窗口或已被使用（重放）
    pub async fn use_nonce(
        &self,
        server_url: &str,
        timestamp: i64,
        salt: &str,
    ) -> StoreResult<bool> {
        let now = self.clock.now();
        if !self.is_fresh(timestamp, now) {
            debug!(
                "Rejecting nonce outside skew window: timestamp={}, now={}, skew={}",
                timestamp, now, self.skew
            );
            return Ok(false);
        }

        let key = nonce_key(server_url, timestamp, salt)?;
        let value = timestamp.to_string();

        let accepted = self
            .records
            .update(&self.option, |records| {
                if records.contains_key(&key) {
                    Update::Skip(false)
                } else {
                    records.insert(key.clone(), value.clone());
                    Update::Commit(true)
                }
            })
            .await?;

        if !accepted {
            debug!("Nonce replay detected for {} at {}", server_url, timestamp);
        }
        Ok(accepted)
    }

    /// 清理超出时间窗口的 nonce
    ///
    /// # Returns
    /// 被清理的数量
    pub async fn cleanup_expired(&self) -> StoreResult<usize> {
        let now = self.clock.now();

        let removed = self
            .records
            .update(&self.option, |records| {
                let before = records.len();
                records.retain(|key, value| match value.parse::<i64>() {
                    Ok(timestamp) => self.is_fresh(timestamp, now),
                    Err(e) => {
                        warn!("Dropping unreadable nonce {}: {}", key, e);
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
            info!("Cleaned up {} expired nonces", removed);
        }
        Ok(removed)
    }

    /// 清空所有 nonce
    pub async fn reset(&self) -> StoreResult<()> {
        self.records.replace(&self.option, Records::new()).await?;
        info!("All nonces cleared");
        Ok(())
    }

    /// 当前保存的 nonce 数量
    pub async fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read_fresh(&self.option).await?.records.len())
    }
}

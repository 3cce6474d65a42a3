//! 定时清理任务
//!
//! 按固定间隔清理过期的 nonce 与 association，直到收到关闭信号。
//! 单次清理失败只记录日志，下一个周期继续。

use liberatid_store::{CleanupReport, OpenIdStore};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// 定时清理调度器
pub struct CleanupScheduler {
    store: OpenIdStore,
    interval: Duration,
    run_on_start: bool,
}

impl CleanupScheduler {
    pub fn new(store: OpenIdStore, interval: Duration, run_on_start: bool) -> Self {
        Self {
            store,
            interval,
            run_on_start,
        }
    }

    /// 执行一次清理，出错时只记录日志
    pub async fn sweep(&self) -> Option<CleanupReport> {
        match self.store.cleanup().await {
            Ok(report) => {
                if report.associations_removed > 0 || report.nonces_removed > 0 {
                    info!(
                        "🧹 Cleanup finished: {} nonces, {} associations removed",
                        report.nonces_removed, report.associations_removed
                    );
                }
                Some(report)
            }
            Err(e) => {
                error!("Failed to cleanup expired records: {}", e);
                None
            }
        }
    }

    /// 在后台运行，收到关闭信号后退出
    ///
    /// # Returns
    /// 任务句柄，结果为已完成的清理次数
    pub fn start(self, shutdown_tx: &broadcast::Sender<()>) -> JoinHandle<u64> {
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // interval 的第一次 tick 立即完成
            if !self.run_on_start {
                ticker.tick().await;
            }

            info!(
                "Cleanup scheduler started (interval={}s)",
                self.interval.as_secs()
            );

            let mut sweeps = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                        sweeps += 1;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Cleanup scheduler received shutdown signal");
                        break;
                    }
                }
            }

            info!("Cleanup scheduler stopped after {} sweeps", sweeps);
            sweeps
        })
    }
}

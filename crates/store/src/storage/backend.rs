//! 记录存储后端抽象接口
//!
//! 后端只负责“命名 blob”的整体读写：每个 blob 是一份 key -> value 映射，
//! 连同一个单调递增的版本号一起保存。读改写的原子性由
//! `compare_and_swap` 保证，上层据此实现无丢失更新的写入。

use crate::error::StoreResult;
use crate::types::{Records, Snapshot};
use async_trait::async_trait;

/// 记录存储后端抽象接口
///
/// 所有存储后端（内存, SQLite, Redis）都需要实现此 trait
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// 初始化存储后端
    ///
    /// 执行必要的初始化操作，如创建表等
    async fn init(&self) -> StoreResult<()>;

    /// 读取整个 blob
    ///
    /// # Returns
    /// * 不存在时返回空映射与版本 0
    async fn load(&self, name: &str) -> StoreResult<Snapshot>;

    /// 仅当当前版本等于 `expected_version` 时写入新内容
    ///
    /// # Arguments
    /// * `name` - blob 名称
    /// * `expected_version` - 读取时的版本，0 表示期望 blob 尚不存在
    /// * `records` - 新内容
    ///
    /// # Returns
    /// * `Ok(true)` - 写入成功，版本变为 `expected_version + 1`
    /// * `Ok(false)` - 版本已被其他写者修改，未写入
    async fn compare_and_swap(
        &self,
        name: &str,
        expected_version: u64,
        records: &Records,
    ) -> StoreResult<bool>;

    /// 无条件覆盖整个 blob，版本号递增
    async fn overwrite(&self, name: &str, records: &Records) -> StoreResult<()>;
}

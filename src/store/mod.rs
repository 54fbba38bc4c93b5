//! 键值存储接口
//!
//! 限流器和缓存层只通过 [`KvStore`] 访问共享存储，生产环境是 Redis，
//! 测试和本地开发可以用 [`MemoryStore`]。

mod memory;
mod redis_store;

use async_trait::async_trait;

use crate::error::StoreError;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// 键的剩余存活时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// 键不存在
    Missing,
    /// 键存在但没有过期时间
    Persistent,
    /// 剩余秒数
    Expires(u64),
}

/// 一次 SCAN 的结果，`cursor` 为 0 表示遍历结束
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// 原子自增，返回自增后的值；键不存在时从 0 开始
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// 设置过期时间，键不存在时返回 false
    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// 写入并设置过期时间，覆盖已有的值
    async fn set_with_ttl(&self, key: &str, value: &[u8], seconds: u64)
    -> Result<(), StoreError>;

    /// 删除若干键，返回实际删除的数量
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// 从 `cursor` 开始检查至多约 `batch` 个键，返回其中匹配 `pattern` 的键
    async fn scan_match(
        &self,
        cursor: u64,
        pattern: &str,
        batch: usize,
    ) -> Result<ScanPage, StoreError>;
}

//! 商品记录存储
//!
//! 唯一性和数值范围由存储本身保证（数据库约束），这里只定义调用接口。

mod memory;
pub mod models;
mod postgres;
mod seed;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RecordStoreError;

use self::models::{NewProduct, Product, ProductChanges};

pub use self::memory::MemoryProductStore;
pub use self::postgres::PgProductStore;
pub use self::seed::seed_if_empty;

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, RecordStoreError>;

    /// 按创建时间排序分页，`page` 从 1 开始
    async fn list(&self, page: u32, limit: u32) -> Result<Vec<Product>, RecordStoreError>;

    async fn count(&self) -> Result<i64, RecordStoreError>;

    async fn insert(&self, product: NewProduct) -> Result<Product, RecordStoreError>;

    /// 商品不存在时返回 `None`
    async fn update(
        &self,
        id: Uuid,
        changes: ProductChanges,
    ) -> Result<Option<Product>, RecordStoreError>;

    /// 返回是否删除了记录
    async fn delete(&self, id: Uuid) -> Result<bool, RecordStoreError>;
}

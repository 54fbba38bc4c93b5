use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ProductStore;
use super::models::{NewProduct, Product, ProductChanges};
use crate::error::RecordStoreError;

/// 内存实现，约束与数据库表一致。记录读取次数，便于验证缓存命中
#[derive(Default)]
pub struct MemoryProductStore {
    products: RwLock<Vec<Product>>,
    reads: AtomicUsize,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `find_by_id`、`list` 和 `count` 的累计调用次数
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

fn check_constraints(product: &Product) -> Result<(), RecordStoreError> {
    if product.name.is_empty() || product.category.is_empty() || product.sku.is_empty() {
        return Err(RecordStoreError::Rejected(
            "Invalid product: empty required field".to_string(),
        ));
    }
    if product.price < 0.0 || product.stock < 0 {
        return Err(RecordStoreError::Rejected(
            "Invalid product: negative price or stock".to_string(),
        ));
    }
    Ok(())
}

fn check_sku(products: &[Product], sku: &str, except: Option<Uuid>) -> Result<(), RecordStoreError> {
    if products
        .iter()
        .any(|p| p.sku == sku && Some(p.id) != except)
    {
        return Err(RecordStoreError::Conflict("SKU already exists".to_string()));
    }
    Ok(())
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, RecordStoreError> {
        self.record_read();
        let products = self.products.read().await;
        Ok(products.iter().find(|p| p.id == id).cloned())
    }

    async fn list(&self, page: u32, limit: u32) -> Result<Vec<Product>, RecordStoreError> {
        self.record_read();
        let skip = (page.max(1) as usize - 1) * limit as usize;
        let products = self.products.read().await;
        Ok(products
            .iter()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64, RecordStoreError> {
        self.record_read();
        Ok(self.products.read().await.len() as i64)
    }

    async fn insert(&self, product: NewProduct) -> Result<Product, RecordStoreError> {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: product.name,
            description: product.description,
            price: product.price,
            category: product.category,
            sku: product.sku,
            stock: product.stock,
            created_at: now,
            updated_at: now,
        };
        check_constraints(&product)?;

        let mut products = self.products.write().await;
        check_sku(&products, &product.sku, None)?;
        products.push(product.clone());
        Ok(product)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: ProductChanges,
    ) -> Result<Option<Product>, RecordStoreError> {
        let mut products = self.products.write().await;
        let Some(index) = products.iter().position(|p| p.id == id) else {
            return Ok(None);
        };

        let mut updated = products[index].clone();
        if let Some(name) = changes.name {
            updated.name = name;
        }
        if let Some(description) = changes.description {
            updated.description = Some(description);
        }
        if let Some(price) = changes.price {
            updated.price = price;
        }
        if let Some(category) = changes.category {
            updated.category = category;
        }
        if let Some(sku) = changes.sku {
            updated.sku = sku;
        }
        if let Some(stock) = changes.stock {
            updated.stock = stock;
        }
        updated.updated_at = Utc::now();

        check_constraints(&updated)?;
        check_sku(&products, &updated.sku, Some(id))?;
        products[index] = updated.clone();
        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RecordStoreError> {
        let mut products = self.products.write().await;
        let before = products.len();
        products.retain(|p| p.id != id);
        Ok(products.len() < before)
    }
}

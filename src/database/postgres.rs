use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::ProductStore;
use super::models::{NewProduct, Product, ProductChanges};
use crate::error::RecordStoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id          UUID PRIMARY KEY,
    name        TEXT NOT NULL CHECK (length(name) > 0),
    description TEXT,
    price       DOUBLE PRECISION NOT NULL CHECK (price >= 0),
    category    TEXT NOT NULL CHECK (length(category) > 0),
    sku         TEXT NOT NULL UNIQUE CHECK (length(sku) > 0),
    stock       INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
)
"#;

pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建表，启动时调用一次
    pub async fn ensure_schema(&self) -> Result<(), RecordStoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn map_db_error(err: sqlx::Error) -> RecordStoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RecordStoreError::Conflict("SKU already exists".to_string());
        }
        if db.is_check_violation() {
            return RecordStoreError::Rejected(format!("Invalid product: {}", db.message()));
        }
    }
    RecordStoreError::Database(err)
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, RecordStoreError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn list(&self, page: u32, limit: u32) -> Result<Vec<Product>, RecordStoreError> {
        let offset = (i64::from(page.max(1)) - 1) * i64::from(limit);
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products ORDER BY created_at, id LIMIT $1 OFFSET $2",
        )
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    async fn count(&self) -> Result<i64, RecordStoreError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn insert(&self, product: NewProduct) -> Result<Product, RecordStoreError> {
        let now = Utc::now();
        sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products
                (id, name, description, price, category, sku, stock, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product.name)
        .bind(product.description)
        .bind(product.price)
        .bind(product.category)
        .bind(product.sku)
        .bind(product.stock)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: ProductChanges,
    ) -> Result<Option<Product>, RecordStoreError> {
        sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                category = COALESCE($5, category),
                sku = COALESCE($6, sku),
                stock = COALESCE($7, stock),
                updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.price)
        .bind(changes.category)
        .bind(changes.sku)
        .bind(changes.stock)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RecordStoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

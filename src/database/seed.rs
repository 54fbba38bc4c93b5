use super::ProductStore;
use super::models::NewProduct;
use crate::error::RecordStoreError;

const SEED_PRODUCTS: &[(&str, &str, f64, &str, &str, i32)] = &[
    ("Laptop Pro", "High performance laptop", 1299.99, "Electronics", "ELEC-001", 50),
    ("Wireless Mouse", "Ergonomic wireless mouse", 49.99, "Electronics", "ELEC-002", 200),
    ("Mechanical Keyboard", "RGB mechanical keyboard", 109.99, "Electronics", "ELEC-003", 150),
    ("Desk Chair", "Ergonomic office chair", 249.50, "Furniture", "FURN-001", 30),
    ("Standing Desk", "Motorized standing desk", 499.00, "Furniture", "FURN-002", 15),
    ("Coffee Maker", "Drip coffee maker", 79.99, "Appliances", "APPL-001", 100),
    ("Blender", "High-speed blender", 119.50, "Appliances", "APPL-002", 80),
    ("Yoga Mat", "Non-slip yoga mat", 29.99, "Fitness", "FIT-001", 300),
    ("Dumbbell Set", "Adjustable dumbbells", 199.99, "Fitness", "FIT-002", 40),
    ("Water Bottle", "Insulated stainless steel", 24.99, "Accessories", "ACC-001", 500),
];

/// 数据库为空时写入示例商品，返回写入的数量
pub async fn seed_if_empty(store: &dyn ProductStore) -> Result<usize, RecordStoreError> {
    let existing = store.count().await?;
    if existing > 0 {
        tracing::info!("Database already contains {} products, skipping seed", existing);
        return Ok(0);
    }

    tracing::info!("Database is empty, seeding {} products", SEED_PRODUCTS.len());
    for &(name, description, price, category, sku, stock) in SEED_PRODUCTS {
        store
            .insert(NewProduct {
                name: name.to_string(),
                description: Some(description.to_string()),
                price,
                category: category.to_string(),
                sku: sku.to_string(),
                stock,
            })
            .await?;
    }

    Ok(SEED_PRODUCTS.len())
}

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::AppState;
use crate::cache::keys::{entity_key, list_key};
use crate::database::models::{NewProduct, Product, ProductChanges};
use crate::error::AppError;

use super::model::{ListQuery, ProductPage};

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("Invalid product ID format".to_string()))
}

fn not_found() -> AppError {
    AppError::NotFound("Product not found".to_string())
}

#[axum::debug_handler]
pub async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = state.products.insert(req).await?;

    // 新商品还没有单品缓存，只需清掉列表
    state.cache.invalidate_all_lists().await;

    tracing::info!("Created product {} ({})", product.id, product.sku);
    Ok((StatusCode::CREATED, Json(product)))
}

#[axum::debug_handler]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ProductPage>, AppError> {
    let (page, limit) = query.resolve()?;
    let cache_key = list_key(page, limit);

    if let Some(cached) = state.cache.get::<ProductPage>(&cache_key).await {
        return Ok(Json(cached));
    }

    let products = state.products.list(page, limit).await?;
    let total = state.products.count().await?;
    let body = ProductPage {
        products,
        total,
        page,
        limit,
    };

    state.cache.set(&cache_key, &body).await;
    Ok(Json(body))
}

#[axum::debug_handler]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, AppError> {
    let id = parse_id(&id)?;
    let cache_key = entity_key(&id.to_string());

    if let Some(cached) = state.cache.get::<Product>(&cache_key).await {
        return Ok(Json(cached));
    }

    // 不存在的商品不缓存，每次都回源
    let product = state.products.find_by_id(id).await?.ok_or_else(not_found)?;

    state.cache.set(&cache_key, &product).await;
    Ok(Json(product))
}

#[axum::debug_handler]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(changes): Json<ProductChanges>,
) -> Result<Json<Product>, AppError> {
    let id = parse_id(&id)?;
    if changes.is_empty() {
        return Err(AppError::BadRequest(
            "No fields provided for update".to_string(),
        ));
    }

    let product = state
        .products
        .update(id, changes)
        .await?
        .ok_or_else(not_found)?;

    state.cache.invalidate_product(&id.to_string()).await;
    Ok(Json(product))
}

#[axum::debug_handler]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    if !state.products.delete(id).await? {
        return Err(not_found());
    }

    state.cache.invalidate_product(&id.to_string()).await;
    tracing::info!("Deleted product {}", id);
    Ok(StatusCode::NO_CONTENT)
}

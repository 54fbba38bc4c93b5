use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};

use crate::{
    AppState,
    middleware::{RateLimiter, log_errors, rate_limit},
    routes,
};

/// 组装完整路由。限流在最外层业务中间件，被拒绝的请求不会到达缓存和数据库
pub fn build_router(state: AppState, limiter: Arc<RateLimiter>) -> Router {
    // 列表和创建同时接受带尾部斜杠的路径
    let collection =
        get(routes::product::list_products).post(routes::product::create_product);

    let router = Router::new()
        .route("/api/products", collection.clone())
        .route("/api/products/", collection)
        .route(
            "/api/products/{id}",
            get(routes::product::get_product)
                .put(routes::product::update_product)
                .delete(routes::product::delete_product),
        )
        .route("/health", get(routes::health_check))
        .layer(from_fn_with_state(limiter, rate_limit))
        .layer(from_fn(log_errors));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use catalog::{
    AppState,
    cache::ProductCache,
    clock::SystemClock,
    config::Config,
    database::{PgProductStore, seed_if_empty},
    middleware::{RateLimitConfig, RateLimiter},
    router::build_router,
    store::{KvStore, RedisStore},
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    let products = Arc::new(PgProductStore::new(pool.clone()));
    products
        .ensure_schema()
        .await
        .expect("Failed to create products table");

    if config.seed_on_startup {
        seed_if_empty(products.as_ref())
            .await
            .expect("Failed to seed products");
    }

    // Redis 连接，限流器和缓存共用
    let kv: Arc<dyn KvStore> = Arc::new(
        RedisStore::connect(&config.redis_url, config.store_timeout())
            .await
            .expect("Failed to connect to Redis"),
    );

    let limiter = Arc::new(RateLimiter::new(
        kv.clone(),
        Arc::new(SystemClock),
        RateLimitConfig::from(&config),
    ));
    tracing::info!(
        "Rate limit: {} requests per {}s per client, store failures {:?}",
        config.rate_limit_requests,
        config.rate_limit_window_secs,
        config.rate_limit_fail_mode
    );

    let state = AppState {
        config: config.clone(),
        products,
        cache: ProductCache::from_config(kv, &config),
    };

    let app = build_router(state, limiter);

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    pool.close().await;
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

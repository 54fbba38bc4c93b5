use std::sync::Arc;

use cache::ProductCache;
use config::Config;
use database::ProductStore;

pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod store;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub products: Arc<dyn ProductStore>,
    pub cache: ProductCache,
}

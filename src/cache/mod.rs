//! 商品查询结果的旁路缓存
//!
//! 读路径先查缓存，未命中再查数据库并回填；写路径成功后删除受影响的键。
//! 缓存存储的任何故障都只记日志，调用方看到的永远是"未命中"。

pub mod keys;

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::config::Config;
use crate::store::KvStore;

use self::keys::{LIST_PATTERN, entity_key};

#[derive(Clone)]
pub struct ProductCache {
    store: Arc<dyn KvStore>,
    ttl_secs: u64,
    scan_batch: usize,
}

impl ProductCache {
    pub fn new(store: Arc<dyn KvStore>, ttl_secs: u64, scan_batch: usize) -> Self {
        Self {
            store,
            ttl_secs,
            scan_batch: scan_batch.max(1),
        }
    }

    pub fn from_config(store: Arc<dyn KvStore>, config: &Config) -> Self {
        Self::new(store, config.cache_ttl_secs, config.cache_scan_batch)
    }

    /// 读取缓存；键不存在、已过期、存储不可用或内容损坏都返回 `None`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!("Cache hit: {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Discarding corrupt cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// 使用默认过期时间写入
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.ttl_secs).await;
    }

    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let json = match serde_json::to_vec(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };

        match self.store.set_with_ttl(key, &json, ttl_secs).await {
            Ok(()) => debug!("Cache set: {} (ttl {}s)", key, ttl_secs),
            Err(e) => warn!("Cache write failed for {}: {}", key, e),
        }
    }

    pub async fn invalidate_entity(&self, id: &str) {
        let key = entity_key(id);
        if let Err(e) = self.store.delete(&[key.clone()]).await {
            warn!("Failed to invalidate {}: {}", key, e);
        }
    }

    /// 分批 SCAN 删除所有列表缓存，返回删除的键数量。
    ///
    /// 任何一次写入都可能改变总数和分页内容，所以不区分页码和每页数量。
    pub async fn invalidate_all_lists(&self) -> u64 {
        let mut cursor = 0;
        let mut removed = 0;

        loop {
            let page = match self
                .store
                .scan_match(cursor, LIST_PATTERN, self.scan_batch)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!("List cache invalidation aborted after {} keys: {}", removed, e);
                    return removed;
                }
            };

            if !page.keys.is_empty() {
                match self.store.delete(&page.keys).await {
                    Ok(n) => removed += n,
                    Err(e) => {
                        warn!("List cache invalidation aborted after {} keys: {}", removed, e);
                        return removed;
                    }
                }
            }

            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }

        if removed > 0 {
            debug!("Invalidated {} list cache entries", removed);
        }
        removed
    }

    /// 更新或删除商品后调用
    pub async fn invalidate_product(&self, id: &str) {
        self.invalidate_entity(id).await;
        self.invalidate_all_lists().await;
    }
}

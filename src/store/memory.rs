use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use globset::Glob;
use tokio::sync::Mutex;

use super::{KeyTtl, KvStore, ScanPage};
use crate::clock::Clock;
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
    // 创建顺序，作为 SCAN 游标
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Inner {
    fn purge_if_expired(&mut self, key: &str, now: DateTime<Utc>) {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.entries.remove(key);
        }
    }

    fn live(&mut self, key: &str, now: DateTime<Utc>) -> Option<&mut Entry> {
        self.purge_if_expired(key, now);
        self.entries.get_mut(key)
    }

    fn insert(&mut self, key: &str, value: Value, expires_at: Option<DateTime<Utc>>) {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = value;
                entry.expires_at = expires_at;
            }
            None => {
                self.next_seq += 1;
                let seq = self.next_seq;
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        value,
                        expires_at,
                        seq,
                    },
                );
            }
        }
    }
}

/// 进程内的键值存储，语义与 Redis 对应命令一致，过期时间由注入的时钟判断。
///
/// 可以通过 [`MemoryStore::set_available`] 模拟存储宕机。
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self, op: &'static str) -> Result<DateTime<Utc>, StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(self.clock.now())
        } else {
            Err(StoreError::Unavailable {
                op,
                reason: "memory store is offline".to_string(),
            })
        }
    }
}

fn expiry(now: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    now + TimeDelta::seconds(seconds as i64)
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.check("INCR")?;
        let mut inner = self.inner.lock().await;

        let next = match inner.live(key, now) {
            Some(entry) => {
                let current = match &entry.value {
                    Value::Counter(n) => *n,
                    Value::Bytes(bytes) => std::str::from_utf8(bytes)
                        .ok()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| StoreError::Command {
                            op: "INCR",
                            reason: "value is not an integer".to_string(),
                        })?,
                };
                let next = current + 1;
                entry.value = Value::Counter(next);
                next
            }
            None => {
                inner.insert(key, Value::Counter(1), None);
                1
            }
        };

        Ok(next)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        let now = self.check("EXPIRE")?;
        let mut inner = self.inner.lock().await;

        Ok(match inner.live(key, now) {
            Some(entry) => {
                entry.expires_at = Some(expiry(now, seconds));
                true
            }
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let now = self.check("TTL")?;
        let mut inner = self.inner.lock().await;

        Ok(match inner.live(key, now) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                // 与 Redis 一样四舍五入到秒
                let millis = (*at - now).num_milliseconds().max(0);
                KeyTtl::Expires(((millis + 500) / 1000) as u64)
            }
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.check("GET")?;
        let mut inner = self.inner.lock().await;

        Ok(inner.live(key, now).map(|entry| match &entry.value {
            Value::Counter(n) => n.to_string().into_bytes(),
            Value::Bytes(bytes) => bytes.clone(),
        }))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        seconds: u64,
    ) -> Result<(), StoreError> {
        let now = self.check("SET")?;
        let mut inner = self.inner.lock().await;
        inner.purge_if_expired(key, now);
        inner.insert(key, Value::Bytes(value.to_vec()), Some(expiry(now, seconds)));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let now = self.check("DEL")?;
        let mut inner = self.inner.lock().await;

        let mut removed = 0;
        for key in keys {
            inner.purge_if_expired(key, now);
            if inner.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan_match(
        &self,
        cursor: u64,
        pattern: &str,
        batch: usize,
    ) -> Result<ScanPage, StoreError> {
        let now = self.check("SCAN")?;
        let matcher = Glob::new(pattern)
            .map_err(|e| StoreError::Command {
                op: "SCAN",
                reason: e.to_string(),
            })?
            .compile_matcher();
        let inner = self.inner.lock().await;

        let mut candidates: Vec<(u64, &String)> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.seq >= cursor && e.expires_at.is_none_or(|at| at > now))
            .map(|(k, e)| (e.seq, k))
            .collect();
        candidates.sort_unstable_by_key(|(seq, _)| *seq);

        let batch = batch.max(1);
        let next_cursor = match candidates.get(batch) {
            Some((seq, _)) => *seq,
            None => 0,
        };
        let keys = candidates
            .into_iter()
            .take(batch)
            .filter(|(_, k)| matcher.is_match(k.as_str()))
            .map(|(_, k)| k.clone())
            .collect();

        Ok(ScanPage {
            cursor: next_cursor,
            keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    async fn matched(store: &MemoryStore, pattern: &str) -> Vec<String> {
        let mut keys = store.scan_match(0, pattern, 100).await.unwrap().keys;
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn scan_filters_keys_by_pattern() {
        let store = MemoryStore::new(Arc::new(ManualClock::default()));
        for key in [
            "cache:list:1:10",
            "cache:list:2:10",
            "cache:entity:7",
            "ratelimit:1.2.3.4",
            "ratelimit:10.0.0.1",
        ] {
            store.set_with_ttl(key, b"x", 60).await.unwrap();
        }

        assert_eq!(
            matched(&store, "cache:list:*").await,
            vec!["cache:list:1:10", "cache:list:2:10"]
        );
        assert_eq!(matched(&store, "cache:*:7").await, vec!["cache:entity:7"]);
        assert_eq!(matched(&store, "ratelimit:?.?.?.?").await, vec!["ratelimit:1.2.3.4"]);
        assert_eq!(matched(&store, "cache:list:[1]:*").await, vec!["cache:list:1:10"]);
        assert_eq!(matched(&store, "*").await.len(), 5);
    }

    #[tokio::test]
    async fn malformed_scan_pattern_is_a_command_error() {
        let store = MemoryStore::new(Arc::new(ManualClock::default()));
        assert!(matches!(
            store.scan_match(0, "cache:list:[", 100).await,
            Err(StoreError::Command { op: "SCAN", .. })
        ));
    }

    #[tokio::test]
    async fn scan_survives_deletes_between_batches() {
        let store = MemoryStore::new(Arc::new(ManualClock::default()));
        for i in 0..25 {
            store
                .set_with_ttl(&format!("cache:list:{}:10", i), b"[]", 60)
                .await
                .unwrap();
        }

        let mut cursor = 0;
        let mut seen = 0;
        loop {
            let page = store.scan_match(cursor, "cache:list:*", 7).await.unwrap();
            seen += page.keys.len();
            store.delete(&page.keys).await.unwrap();
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }

        assert_eq!(seen, 25);
        let page = store.scan_match(0, "*", 100).await.unwrap();
        assert!(page.keys.is_empty());
    }

    #[tokio::test]
    async fn expired_keys_disappear() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryStore::new(clock.clone());

        store.set_with_ttl("k", b"v", 2).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Expires(2));

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn counters_read_back_as_digits() {
        let store = MemoryStore::new(Arc::new(ManualClock::default()));
        store.incr("c").await.unwrap();
        store.incr("c").await.unwrap();
        assert_eq!(store.get("c").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.ttl("c").await.unwrap(), KeyTtl::Persistent);

        store.set_with_ttl("s", b"abc", 10).await.unwrap();
        assert!(matches!(
            store.incr("s").await,
            Err(StoreError::Command { op: "INCR", .. })
        ));
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryStore::new(Arc::new(ManualClock::default()));
        store.set_available(false);
        assert!(matches!(
            store.incr("x").await,
            Err(StoreError::Unavailable { op: "INCR", .. })
        ));
        assert!(store.get("x").await.is_err());
    }
}

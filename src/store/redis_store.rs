use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{RedisResult, aio::MultiplexedConnection};
use tracing::{debug, error};

use super::{KeyTtl, KvStore, ScanPage};
use crate::error::StoreError;

/// Redis 实现。连接在启动时建立一次，之后所有调用共享同一个多路复用连接
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    timeout: Duration,
}

impl RedisStore {
    /// 建立连接并 PING 一次，每次调用都受 `timeout` 约束
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            StoreError::from_redis("OPEN", e)
        })?;

        let conn = match tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(StoreError::from_redis("CONNECT", e)),
            Err(_) => {
                return Err(StoreError::Timeout {
                    op: "CONNECT",
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        let store = Self { conn, timeout };
        let mut conn = store.conn.clone();
        let _: String = store
            .run("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        debug!("Connected to Redis at {}", url);

        Ok(store)
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::from_redis(op, e)),
            Err(_) => Err(StoreError::Timeout {
                op,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.run("INCR", redis::cmd("INCR").arg(key).query_async(&mut conn))
            .await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        self.run(
            "EXPIRE",
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(seconds)
                .query_async(&mut conn),
        )
        .await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let mut conn = self.conn.clone();
        let ttl: i64 = self
            .run("TTL", redis::cmd("TTL").arg(key).query_async(&mut conn))
            .await?;

        // -2: 键不存在, -1: 没有过期时间
        Ok(match ttl {
            -2 => KeyTtl::Missing,
            t if t < 0 => KeyTtl::Persistent,
            t => KeyTtl::Expires(t as u64),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        self.run("GET", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        seconds: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.run(
            "SET",
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(seconds)
                .query_async(&mut conn),
        )
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        self.run("DEL", redis::cmd("DEL").arg(keys).query_async(&mut conn))
            .await
    }

    async fn scan_match(
        &self,
        cursor: u64,
        pattern: &str,
        batch: usize,
    ) -> Result<ScanPage, StoreError> {
        let mut conn = self.conn.clone();
        let (cursor, keys): (u64, Vec<String>) = self
            .run(
                "SCAN",
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(batch)
                    .query_async(&mut conn),
            )
            .await?;

        Ok(ScanPage { cursor, keys })
    }
}

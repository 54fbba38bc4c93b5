use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    cache::keys::rate_limit_key,
    clock::Clock,
    config::{Config, FailMode},
    error::{AppError, RateLimitError},
    store::{KeyTtl, KvStore},
};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// 每个窗口允许的请求数
    pub limit: u64,
    pub window_secs: u64,
    pub fail_mode: FailMode,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window_secs: 60,
            fail_mode: FailMode::Open,
        }
    }
}

impl From<&Config> for RateLimitConfig {
    fn from(config: &Config) -> Self {
        Self {
            limit: config.rate_limit_requests,
            window_secs: config.rate_limit_window().as_secs(),
            fail_mode: config.rate_limit_fail_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// 自增后的计数
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    /// 拒绝时建议的重试秒数，放行时为 0
    pub retry_after_secs: u64,
    /// 已知的窗口结束时间
    pub reset_at: Option<DateTime<Utc>>,
}

/// 固定窗口限流器。
///
/// 窗口从过期后的第一次请求开始计时，因此在窗口交界处最多可以连续放行
/// `2 * limit` 个请求。这是固定窗口计数的已知特性。
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// 用注入的时钟判定一次请求
    pub async fn check(&self, identity: &str) -> Result<Decision, RateLimitError> {
        self.admit(identity, self.clock.now()).await
    }

    /// 计数加一并判定是否放行。被拒绝的请求同样计数。
    pub async fn admit(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, RateLimitError> {
        validate_identity(identity)?;

        let key = rate_limit_key(identity);
        let window = self.config.window_secs;

        // 单次往返的原子 INCR，并发请求不会丢计数
        let count = self.store.incr(&key).await?.max(0) as u64;

        let mut reset_at = None;
        if count == 1 {
            // 窗口内第一次请求，设置过期时间
            self.store.expire(&key, window).await?;
            reset_at = Some(now + TimeDelta::seconds(window as i64));
        }

        if count > self.config.limit {
            let retry_after_secs = self.retry_after(&key).await;
            tracing::debug!(
                "Rate limit exceeded for {}: {} > {}, retry after {}s",
                identity,
                count,
                self.config.limit,
                retry_after_secs
            );
            return Ok(Decision {
                allowed: false,
                count,
                limit: self.config.limit,
                remaining: 0,
                retry_after_secs,
                reset_at: Some(now + TimeDelta::seconds(retry_after_secs as i64)),
            });
        }

        Ok(Decision {
            allowed: true,
            count,
            limit: self.config.limit,
            remaining: self.config.limit - count,
            retry_after_secs: 0,
            reset_at,
        })
    }

    async fn retry_after(&self, key: &str) -> u64 {
        let window = self.config.window_secs;
        match self.store.ttl(key).await {
            Ok(KeyTtl::Expires(secs)) if secs > 0 => secs,
            Ok(KeyTtl::Persistent) => {
                // 设置过期时间的那次调用丢失了，补上，否则计数永不重置
                tracing::warn!("Rate limit key {} had no expiry, re-arming window", key);
                if let Err(e) = self.store.expire(key, window).await {
                    tracing::warn!("Failed to re-arm rate limit key {}: {}", key, e);
                }
                window
            }
            // 键在 INCR 和 TTL 之间过期
            Ok(_) => window,
            Err(e) => {
                tracing::debug!("TTL lookup failed for {}: {}", key, e);
                window
            }
        }
    }
}

/// 标识会被拼进键名并参与 SCAN 匹配，不允许空白、控制字符和通配符
fn validate_identity(identity: &str) -> Result<(), RateLimitError> {
    let valid = !identity.is_empty()
        && identity
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && !matches!(c, '*' | '?' | '[' | ']'));
    if valid {
        Ok(())
    } else {
        Err(RateLimitError::InvalidIdentity(identity.to_string()))
    }
}

/// 限流中间件。
///
/// 标识只取 TCP 对端地址，不信任 `X-Forwarded-For` 等代理头；
/// 部署在反向代理之后时所有请求会共享代理的地址。
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_default();

    match limiter.check(&identity).await {
        Ok(decision) if decision.allowed => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
            response
        }
        Ok(decision) => AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        }
        .into_response(),
        Err(RateLimitError::InvalidIdentity(id)) => {
            tracing::warn!("Admitting request with unusable client identity {:?}", id);
            next.run(req).await
        }
        Err(RateLimitError::StoreUnavailable(e)) => match limiter.config().fail_mode {
            FailMode::Open => {
                tracing::warn!("Rate limiter store unavailable, admitting request: {}", e);
                next.run(req).await
            }
            FailMode::Closed => {
                tracing::error!("Rate limiter store unavailable, rejecting request: {}", e);
                AppError::ServiceUnavailable("Service Unavailable".to_string()).into_response()
            }
        },
    }
}

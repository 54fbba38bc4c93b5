//! 固定窗口限流器，使用内存存储和手动时钟

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;

use catalog::cache::keys::rate_limit_key;
use catalog::clock::{Clock, ManualClock};
use catalog::config::FailMode;
use catalog::error::RateLimitError;
use catalog::middleware::{RateLimitConfig, RateLimiter};
use catalog::store::{KeyTtl, KvStore, MemoryStore};

struct Fixture {
    limiter: Arc<RateLimiter>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn fixture(limit: u64, window_secs: u64) -> Fixture {
    let clock = Arc::new(ManualClock::new(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    ));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let limiter = Arc::new(RateLimiter::new(
        store.clone(),
        clock.clone(),
        RateLimitConfig {
            limit,
            window_secs,
            fail_mode: FailMode::Open,
        },
    ));
    Fixture {
        limiter,
        store,
        clock,
    }
}

async fn stored_count(store: &MemoryStore, identity: &str) -> Option<u64> {
    store
        .get(&rate_limit_key(identity))
        .await
        .unwrap()
        .map(|b| String::from_utf8(b).unwrap().parse().unwrap())
}

#[tokio::test]
async fn call_after_limit_is_denied() {
    let f = fixture(5, 60);

    for i in 1..=5 {
        let decision = f.limiter.check("10.0.0.1").await.unwrap();
        assert!(decision.allowed, "call {} should be admitted", i);
        assert_eq!(decision.count, i);
        assert_eq!(decision.remaining, 5 - i);
    }

    let denied = f.limiter.check("10.0.0.1").await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.retry_after_secs, 60);
}

#[tokio::test]
async fn hundred_calls_then_retry_after_reflects_remaining_window() {
    let f = fixture(100, 60);

    for _ in 0..100 {
        assert!(f.limiter.check("1.2.3.4").await.unwrap().allowed);
        f.clock.advance(Duration::from_millis(9));
    }
    // 100 calls spread over under a second
    f.clock.set(DateTime::from_timestamp(1_700_000_001, 0).unwrap());

    let denied = f.limiter.check("1.2.3.4").await.unwrap();
    assert!(!denied.allowed);
    assert!(
        (58..=60).contains(&denied.retry_after_secs),
        "retry_after was {}",
        denied.retry_after_secs
    );
    assert_eq!(
        denied.reset_at,
        Some(f.clock.now() + chrono::TimeDelta::seconds(denied.retry_after_secs as i64))
    );
}

#[tokio::test]
async fn first_call_after_expiry_starts_a_new_window() {
    let f = fixture(3, 60);

    for _ in 0..10 {
        f.limiter.check("10.0.0.2").await.unwrap();
    }
    assert!(!f.limiter.check("10.0.0.2").await.unwrap().allowed);

    f.clock.advance(Duration::from_secs(60));

    let decision = f.limiter.check("10.0.0.2").await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.count, 1);
    assert_eq!(
        f.store.ttl(&rate_limit_key("10.0.0.2")).await.unwrap(),
        KeyTtl::Expires(60)
    );
}

#[tokio::test]
async fn denied_calls_still_count() {
    let f = fixture(2, 60);

    for _ in 0..7 {
        f.limiter.check("10.0.0.3").await.unwrap();
    }
    assert_eq!(stored_count(&f.store, "10.0.0.3").await, Some(7));
}

#[tokio::test]
async fn expiry_is_set_once_per_window() {
    let f = fixture(10, 60);

    f.limiter.check("10.0.0.4").await.unwrap();
    f.clock.advance(Duration::from_secs(20));
    f.limiter.check("10.0.0.4").await.unwrap();

    // 第二次调用没有重置窗口
    assert_eq!(
        f.store.ttl(&rate_limit_key("10.0.0.4")).await.unwrap(),
        KeyTtl::Expires(40)
    );
}

#[tokio::test]
async fn identities_are_independent() {
    let f = fixture(1, 60);

    assert!(f.limiter.check("10.0.0.5").await.unwrap().allowed);
    assert!(!f.limiter.check("10.0.0.5").await.unwrap().allowed);
    assert!(f.limiter.check("10.0.0.6").await.unwrap().allowed);
}

#[tokio::test]
async fn fixed_window_admits_a_double_burst_across_the_boundary() {
    let f = fixture(100, 60);

    assert!(f.limiter.check("10.0.0.7").await.unwrap().allowed);
    f.clock.advance(Duration::from_secs(59));
    for _ in 0..99 {
        assert!(f.limiter.check("10.0.0.7").await.unwrap().allowed);
    }

    f.clock.advance(Duration::from_secs(1));
    for _ in 0..100 {
        assert!(f.limiter.check("10.0.0.7").await.unwrap().allowed);
    }
    assert!(!f.limiter.check("10.0.0.7").await.unwrap().allowed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_are_never_lost() {
    let f = fixture(100, 60);
    let calls = 250;

    let mut handles = Vec::with_capacity(calls);
    for _ in 0..calls {
        let limiter = f.limiter.clone();
        handles.push(tokio::spawn(
            async move { limiter.check("9.9.9.9").await.unwrap() },
        ));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().allowed {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 100);
    assert_eq!(stored_count(&f.store, "9.9.9.9").await, Some(calls as u64));
}

#[tokio::test]
async fn store_outage_is_reported_as_unavailable() {
    let f = fixture(10, 60);
    f.store.set_available(false);

    assert!(matches!(
        f.limiter.check("10.0.0.8").await,
        Err(RateLimitError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn malformed_identity_is_rejected_before_touching_the_store() {
    let f = fixture(10, 60);

    for identity in ["", "10.0.0.*", "bad id"] {
        assert!(matches!(
            f.limiter.check(identity).await,
            Err(RateLimitError::InvalidIdentity(_))
        ));
    }
    let page = f.store.scan_match(0, "ratelimit:*", 100).await.unwrap();
    assert!(page.keys.is_empty());
}

#[tokio::test]
async fn counter_without_expiry_is_rearmed_on_denial() {
    let f = fixture(2, 60);
    let key = rate_limit_key("10.0.0.9");

    // 模拟 EXPIRE 丢失：计数存在但没有过期时间
    for _ in 0..2 {
        f.store.incr(&key).await.unwrap();
    }
    assert_eq!(f.store.ttl(&key).await.unwrap(), KeyTtl::Persistent);

    let denied = f.limiter.check("10.0.0.9").await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after_secs, 60);
    assert_eq!(f.store.ttl(&key).await.unwrap(), KeyTtl::Expires(60));
}

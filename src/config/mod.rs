use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 限流存储不可用时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailMode {
    /// 放行并记录日志
    #[default]
    Open,
    /// 返回 503
    Closed,
}

impl FromStr for FailMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailMode::Open),
            "closed" => Ok(FailMode::Closed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u64,
    pub rate_limit_fail_mode: FailMode,
    pub cache_ttl_secs: u64,
    pub cache_scan_batch: usize,
    pub store_timeout_ms: u64,
    pub seed_on_startup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/catalog".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            rate_limit_fail_mode: FailMode::Open,
            cache_ttl_secs: 60,
            cache_scan_batch: 100,
            store_timeout_ms: 500,
            seed_on_startup: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// 从任意变量来源读取配置，未设置的可选项使用默认值
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let required =
            |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or(&lookup, "SERVER_PORT", defaults.server_port)?,
            rate_limit_window_secs: nonzero_or(
                &lookup,
                "RATE_LIMIT_WINDOW",
                defaults.rate_limit_window_secs,
            )?,
            rate_limit_requests: nonzero_or(
                &lookup,
                "RATE_LIMIT_REQUESTS",
                defaults.rate_limit_requests,
            )?,
            rate_limit_fail_mode: parse_or(
                &lookup,
                "RATE_LIMIT_FAIL_MODE",
                defaults.rate_limit_fail_mode,
            )?,
            cache_ttl_secs: nonzero_or(&lookup, "CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            cache_scan_batch: nonzero_or(
                &lookup,
                "CACHE_SCAN_BATCH",
                defaults.cache_scan_batch,
            )?,
            store_timeout_ms: nonzero_or(
                &lookup,
                "STORE_TIMEOUT_MS",
                defaults.store_timeout_ms,
            )?,
            seed_on_startup: parse_or(&lookup, "SEED_ON_STARTUP", defaults.seed_on_startup)?,
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

// 只接受正数，显式设置为 0 视为非法
fn nonzero_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default + PartialEq,
{
    let value = parse_or(lookup, name, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            name,
            value: lookup(name).unwrap_or_default(),
        });
    }
    Ok(value)
}

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::fetcher::payload::MoneyFormat;
use crate::types::Source;

pub const BUFF_API_URL: &str = "https://buff.163.com/api/market/goods";
pub const STEAM_API_URL: &str = "https://steamcommunity.com/market/priceoverview/";

/// CS2 app id on both marketplaces.
pub const DEFAULT_APP_ID: u32 = 730;

/// Steam currency code (1 = USD).
pub const DEFAULT_CURRENCY: u32 = 1;

/// Minimum gap between two outbound marketplace requests (milliseconds).
pub const REQUEST_INTERVAL_MS: u64 = 1_000;

/// Per-request network timeout (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Attempts per lookup before the item is given up for this pass.
pub const FETCH_MAX_ATTEMPTS: u32 = 5;

/// Retry backoff is drawn uniformly from [BACKOFF_MIN_SECS, BACKOFF_MAX_SECS).
pub const BACKOFF_MIN_SECS: u64 = 10;
pub const BACKOFF_MAX_SECS: u64 = 15;

/// Collection cadence (seconds).
pub const COLLECTION_INTERVAL_SECS: u64 = 3_600;

pub const STATS_WINDOW_DAYS: u32 = 7;
pub const TREND_WINDOW_DAYS: u32 = 7;
pub const TRENDING_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Marketplace integration used by the collector (MARKET_SOURCE)
    pub source: Source,
    /// Lookup endpoint; defaults to the source's public URL (MARKET_API_URL)
    pub market_api_url: String,
    pub app_id: u32,
    pub currency: u32,
    /// Raw `Cookie` header value sent to buff, if set (MARKET_SESSION_COOKIE)
    pub session_cookie: Option<String>,
    pub request_interval: Duration,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub collection_interval: Duration,
    pub stats_window_days: u32,
    pub trend_window_days: u32,
    pub trending_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            db_path: "tracker.db".to_string(),
            api_port: 3000,
            source: Source::Buff,
            market_api_url: default_api_url(Source::Buff).to_string(),
            app_id: DEFAULT_APP_ID,
            currency: DEFAULT_CURRENCY,
            session_cookie: None,
            request_interval: Duration::from_millis(REQUEST_INTERVAL_MS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            max_attempts: FETCH_MAX_ATTEMPTS,
            backoff_min: Duration::from_secs(BACKOFF_MIN_SECS),
            backoff_max: Duration::from_secs(BACKOFF_MAX_SECS),
            collection_interval: Duration::from_secs(COLLECTION_INTERVAL_SECS),
            stats_window_days: STATS_WINDOW_DAYS,
            trend_window_days: TREND_WINDOW_DAYS,
            trending_limit: TRENDING_LIMIT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let source: Source = std::env::var("MARKET_SOURCE")
            .unwrap_or_else(|_| "buff".to_string())
            .parse()?;

        let cfg = Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "tracker.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            source,
            market_api_url: std::env::var("MARKET_API_URL")
                .unwrap_or_else(|_| default_api_url(source).to_string()),
            app_id: env_parse("MARKET_APP_ID", DEFAULT_APP_ID)?,
            currency: env_parse("MARKET_CURRENCY", DEFAULT_CURRENCY)?,
            session_cookie: std::env::var("MARKET_SESSION_COOKIE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            request_interval: Duration::from_millis(env_parse(
                "REQUEST_INTERVAL_MS",
                REQUEST_INTERVAL_MS,
            )?),
            request_timeout: Duration::from_secs(env_parse(
                "REQUEST_TIMEOUT_SECS",
                REQUEST_TIMEOUT_SECS,
            )?),
            max_attempts: env_parse("FETCH_MAX_ATTEMPTS", FETCH_MAX_ATTEMPTS)?,
            backoff_min: Duration::from_secs(env_parse("BACKOFF_MIN_SECS", BACKOFF_MIN_SECS)?),
            backoff_max: Duration::from_secs(env_parse("BACKOFF_MAX_SECS", BACKOFF_MAX_SECS)?),
            collection_interval: Duration::from_secs(env_parse(
                "COLLECTION_INTERVAL_SECS",
                COLLECTION_INTERVAL_SECS,
            )?),
            stats_window_days: env_parse("STATS_WINDOW_DAYS", STATS_WINDOW_DAYS)?,
            trend_window_days: env_parse("TREND_WINDOW_DAYS", TREND_WINDOW_DAYS)?,
            trending_limit: env_parse("TRENDING_LIMIT", TRENDING_LIMIT)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AppError::Config("FETCH_MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if self.backoff_max < self.backoff_min {
            return Err(AppError::Config(
                "BACKOFF_MAX_SECS must not be below BACKOFF_MIN_SECS".to_string(),
            ));
        }
        if MoneyFormat::for_currency(self.currency).is_none() {
            return Err(AppError::Config(format!(
                "MARKET_CURRENCY {} is not a supported Steam currency",
                self.currency
            )));
        }
        if self.collection_interval.is_zero() {
            return Err(AppError::Config("COLLECTION_INTERVAL_SECS must be positive".to_string()));
        }
        Ok(())
    }
}

pub fn default_api_url(source: Source) -> &'static str {
    match source {
        Source::Buff => BUFF_API_URL,
        Source::Steam => STEAM_API_URL,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} is not a valid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

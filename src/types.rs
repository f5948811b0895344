use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const NS_PER_SEC: i64 = 1_000_000_000;
pub const NS_PER_DAY: i64 = 86_400 * NS_PER_SEC;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Marketplace a price observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Buff,
    Steam,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Buff => "buff",
            Source::Steam => "steam",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buff" => Ok(Source::Buff),
            "steam" => Ok(Source::Steam),
            other => Err(AppError::UnknownSource(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Minimal item identity handed to the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub id: i64,
    pub market_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Weapon,
    Knife,
    Other,
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemType::Weapon => "weapon",
            ItemType::Knife => "knife",
            ItemType::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ItemType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weapon" => Ok(ItemType::Weapon),
            "knife" => Ok(ItemType::Knife),
            "other" => Ok(ItemType::Other),
            other => Err(AppError::Validation(format!("unknown item type {other:?}"))),
        }
    }
}

/// Category fields derived from a market name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemClass {
    pub item_type: ItemType,
    pub weapon: String,
    pub skin: Option<String>,
    pub wear: String,
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

/// One decoded marketplace lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub price: f64,
    pub volume: Option<i64>,
}

// ---------------------------------------------------------------------------
// Derived stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowedStat {
    pub source: Source,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

impl WindowedStat {
    pub fn empty(source: Source) -> Self {
        Self { source, average: 0.0, min: 0.0, max: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendEntry {
    pub item_id: i64,
    pub market_name: String,
    pub latest_average: f64,
    pub prior_average: f64,
    pub percent_change: f64,
}

// ---------------------------------------------------------------------------
// Collection runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Timer,
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Timer => write!(f, "timer"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

pub fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Lower bound (UTC nanoseconds) of a trailing window ending at `now_ns`.
pub fn window_start_ns(now_ns: i64, window: Duration) -> i64 {
    let window_ns = i64::try_from(window.as_nanos()).unwrap_or(i64::MAX);
    now_ns.saturating_sub(window_ns)
}

pub fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 86_400)
}

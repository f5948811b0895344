pub mod client;
pub mod payload;
pub mod rate_limit;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{PriceQuote, Source};

pub use client::MarketClient;

/// Result of one logical price lookup (after retries).
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Price(PriceQuote),
    /// The marketplace answered but has no listing for the name.
    NotFound,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("marketplace returned an invalid price: {0}")]
    InvalidPrice(f64),
}

/// Anything that can price a market name. The collector only talks to this.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn source(&self) -> Source;

    async fn fetch_price(&self, market_name: &str) -> Result<FetchOutcome, FetchError>;
}

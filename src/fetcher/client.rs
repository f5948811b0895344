use async_trait::async_trait;
use reqwest::header;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::payload::{decode, DecodeError, Decoded, MoneyFormat};
use crate::fetcher::rate_limit::{Backoff, RateLimiter};
use crate::fetcher::{FetchError, FetchOutcome, PriceSource};
use crate::types::Source;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Why a single attempt did not produce a usable answer. Both kinds are retried.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("parse: {0}")]
    Parse(String),
}

impl From<DecodeError> for AttemptError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Rejected(m) => AttemptError::Transient(m),
            DecodeError::Malformed(m) => AttemptError::Parse(m),
        }
    }
}

/// Marketplace lookup client: one shared rate-limit gate, bounded retries
/// with randomized backoff, strict payload decoding.
pub struct MarketClient {
    http: reqwest::Client,
    source: Source,
    api_url: String,
    app_id: u32,
    currency: u32,
    money: MoneyFormat,
    session_cookie: Option<String>,
    gate: RateLimiter,
    backoff: Backoff,
    max_attempts: u32,
}

impl MarketClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let money = MoneyFormat::for_currency(cfg.currency).ok_or_else(|| {
            AppError::Config(format!("unsupported MARKET_CURRENCY {}", cfg.currency))
        })?;

        Ok(Self {
            http,
            source: cfg.source,
            api_url: cfg.market_api_url.clone(),
            app_id: cfg.app_id,
            currency: cfg.currency,
            money,
            session_cookie: cfg.session_cookie.clone(),
            gate: RateLimiter::new(cfg.request_interval),
            backoff: Backoff::new(cfg.backoff_min, cfg.backoff_max),
            max_attempts: cfg.max_attempts.max(1),
        })
    }

    fn build_request(&self, market_name: &str) -> reqwest::RequestBuilder {
        let req = self
            .http
            .get(&self.api_url)
            .header(header::ACCEPT, "application/json");

        match self.source {
            Source::Buff => {
                let req = req.query(&[
                    ("game", "csgo"),
                    ("page_num", "1"),
                    ("search", market_name),
                ]);
                match &self.session_cookie {
                    Some(cookie) => req.header(header::COOKIE, cookie),
                    None => req,
                }
            }
            Source::Steam => req.query(&[
                ("country", "US".to_string()),
                ("currency", self.currency.to_string()),
                ("appid", self.app_id.to_string()),
                ("market_hash_name", market_name.to_string()),
            ]),
        }
    }

    async fn attempt(&self, market_name: &str) -> std::result::Result<Decoded, AttemptError> {
        let resp = self
            .build_request(market_name)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AttemptError::Transient(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        Ok(decode(self.source, market_name, &body, self.money)?)
    }
}

#[async_trait]
impl PriceSource for MarketClient {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_price(&self, market_name: &str) -> std::result::Result<FetchOutcome, FetchError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            self.gate.acquire().await;

            match self.attempt(market_name).await {
                Ok(Decoded::Price(quote)) => {
                    if !(quote.price.is_finite() && quote.price > 0.0) {
                        return Err(FetchError::InvalidPrice(quote.price));
                    }
                    debug!(market_name = %market_name, price = quote.price, attempt, "price fetched");
                    return Ok(FetchOutcome::Price(quote));
                }
                Ok(Decoded::Unlisted) => {
                    debug!(market_name = %market_name, "no listing");
                    return Ok(FetchOutcome::NotFound);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        let delay = self.backoff.next_delay();
                        warn!(
                            market_name = %market_name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "lookup failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(FetchError::RetriesExhausted { attempts: self.max_attempts, last_error })
    }
}

/// Database row types matching `migrations/0001_init.sql`.
/// Used by sqlx for typed queries.
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ItemRow {
    pub id: i64,
    pub market_name: String,
    pub item_type: String,
    pub weapon: String,
    pub skin: Option<String>,
    pub wear: String,
    pub buff_price: Option<f64>,
    pub steam_price: Option<f64>,
    pub volume: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PricePointRow {
    pub price: f64,
    pub volume: Option<i64>,
    pub source: String,
    pub recorded_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SourceStatRow {
    pub source: String,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TrendRow {
    pub item_id: i64,
    pub market_name: String,
    pub latest_avg: f64,
    pub prior_avg: f64,
}

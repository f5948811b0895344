use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::Analytics;
use crate::api::health::get_health;
use crate::db::models::ItemRow;
use crate::db::PriceStore;
use crate::error::AppError;
use crate::scheduler::Scheduler;
use crate::types::{days, now_ns, window_start_ns, ItemType, Source, TrendEntry, WindowedStat};

#[derive(Clone)]
pub struct ApiState {
    pub store: PriceStore,
    pub analytics: Analytics,
    pub scheduler: Arc<Scheduler>,
    pub default_source: Source,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/items", get(get_items).post(create_item))
        .route("/items/:id", get(get_item))
        .route("/items/type/:item_type", get(get_items_by_type))
        .route("/prices/:item_id/history", get(get_price_history))
        .route("/prices/analysis/:item_id", get(get_price_analysis))
        .route("/stats/:source", get(get_source_stats))
        .route("/trending", get(get_trending))
        .route("/collect", post(trigger_collection))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ItemsQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct NewItemBody {
    pub market_name: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
    pub source: Option<String>,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub days: Option<u32>,
}

#[derive(Deserialize)]
pub struct TrendingQuery {
    pub source: Option<String>,
    pub limit: Option<usize>,
    pub window_days: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct PricePointResponse {
    pub price: f64,
    pub volume: Option<i64>,
    pub source: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct CollectResponse {
    pub started: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_items(
    State(state): State<ApiState>,
    Query(params): Query<ItemsQuery>,
) -> Result<Json<Vec<ItemRow>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1_000);
    Ok(Json(state.store.list_items(limit).await?))
}

async fn get_items_by_type(
    State(state): State<ApiState>,
    Path(item_type): Path<String>,
    Query(params): Query<ItemsQuery>,
) -> Result<Json<Vec<ItemRow>>, AppError> {
    let item_type: ItemType = item_type.parse()?;
    let limit = params.limit.unwrap_or(100).clamp(1, 1_000);
    Ok(Json(state.store.list_items_by_type(item_type, limit).await?))
}

async fn get_item(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<ItemRow>, AppError> {
    state
        .store
        .get_item(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("item {id}")))
}

async fn create_item(
    State(state): State<ApiState>,
    Json(body): Json<NewItemBody>,
) -> Result<(StatusCode, Json<ItemRow>), AppError> {
    let item = state.store.register_item(&body.market_name).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_price_history(
    State(state): State<ApiState>,
    Path(item_id): Path<i64>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<PricePointResponse>>, AppError> {
    let source = params.source.as_deref().map(str::parse::<Source>).transpose()?;
    let since = window_start_ns(now_ns(), days(params.days.unwrap_or(7)));

    let rows = state.store.price_history(item_id, since, source).await?;
    if rows.is_empty() {
        return Err(AppError::NotFound("no price history found".to_string()));
    }

    Ok(Json(
        rows.into_iter()
            .map(|r| PricePointResponse {
                price: r.price,
                volume: r.volume,
                source: r.source,
                recorded_at: DateTime::from_timestamp_nanos(r.recorded_at),
            })
            .collect(),
    ))
}

async fn get_price_analysis(
    State(state): State<ApiState>,
    Path(item_id): Path<i64>,
) -> Result<Json<Vec<WindowedStat>>, AppError> {
    Ok(Json(state.analytics.item_analysis(item_id).await?))
}

async fn get_source_stats(
    State(state): State<ApiState>,
    Path(source): Path<String>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<WindowedStat>, AppError> {
    let source: Source = source.parse()?;
    Ok(Json(state.analytics.aggregate_stats(source, params.days).await?))
}

async fn get_trending(
    State(state): State<ApiState>,
    Query(params): Query<TrendingQuery>,
) -> Result<Json<Vec<TrendEntry>>, AppError> {
    let source = match params.source.as_deref() {
        Some(s) => s.parse()?,
        None => state.default_source,
    };
    let trending = state
        .analytics
        .trending(source, params.limit, params.window_days)
        .await?;
    Ok(Json(trending))
}

async fn trigger_collection(
    State(state): State<ApiState>,
) -> (StatusCode, Json<CollectResponse>) {
    if state.scheduler.spawn_manual() {
        (StatusCode::ACCEPTED, Json(CollectResponse { started: true }))
    } else {
        (StatusCode::CONFLICT, Json(CollectResponse { started: false }))
    }
}

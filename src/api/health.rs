//! `/health`: scheduler state and the outcome of the last collection pass.
//! A degraded run shows up here as a high `failed` count or a `last_error`.

use axum::{extract::State, Json};

use crate::api::routes::ApiState;
use crate::scheduler::SchedulerStatus;

pub async fn get_health(State(state): State<ApiState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

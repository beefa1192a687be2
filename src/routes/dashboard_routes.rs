use axum::{extract::State, routing::get, Json, Router};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ApiError;
use crate::models::{ApiOk, AppState, QueueStatus};
use crate::services::calendar::day_window;
use crate::store::{AppointmentFilter, QueueFilter};

#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub date: NaiveDate,
    pub waiting: usize,
    pub in_treatment: usize,
    pub completed_today: usize,
    pub appointments_today: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub async fn health() -> Json<ApiOk<HealthData>> {
    Json(ApiOk::new(HealthData { status: "ok" }))
}

/// Today's front-desk counters.
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<ApiOk<DashboardData>>, ApiError> {
    let date = state.clinic_today();
    let (from, to) = day_window(date, state.clinic_offset)
        .ok_or_else(|| ApiError::Internal(format!("no day window for {date}")))?;

    let todays_queue = state
        .queue()
        .list(&QueueFilter {
            checked_in_from: Some(from),
            checked_in_to: Some(to),
            ..Default::default()
        })
        .await?;
    let count = |status: QueueStatus| todays_queue.iter().filter(|e| e.status == status).count();

    let appointments_today = state
        .scheduling()
        .list(&AppointmentFilter {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        })
        .await?
        .iter()
        .filter(|a| a.status.is_active())
        .count();

    Ok(Json(ApiOk::new(DashboardData {
        date,
        waiting: count(QueueStatus::Waiting),
        in_treatment: count(QueueStatus::InTreatment),
        completed_today: count(QueueStatus::Completed),
        appointments_today,
    })))
}

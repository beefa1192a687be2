// src/routes/queue_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{clean_text, deserialize_double_option, parse_date, JsonBody};
use crate::{
    error::ApiError,
    models::{ApiOk, AppState, OkData, QueueEntry, QueueStatus},
    services::{
        calendar::day_window,
        queue::{CheckIn, QueueChanges, WeeklyCompletions},
    },
    store::QueueFilter,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue", post(enqueue).get(list_queue))
        .route("/queue/stats/weekly", get(get_weekly_completions))
        .route(
            "/queue/{queue_entry_id}",
            get(get_queue_entry).patch(patch_queue_entry).delete(dequeue),
        )
        .route("/queue/{queue_entry_id}/status", post(set_queue_status))
}

/* ============================================================
   POST /queue (check-in)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub patient_id: Uuid,
    pub assigned_staff_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

pub async fn enqueue(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<EnqueueRequest>,
) -> Result<Json<ApiOk<QueueEntry>>, ApiError> {
    let entry = state
        .queue()
        .enqueue(CheckIn {
            patient_id: req.patient_id,
            assigned_staff_id: req.assigned_staff_id,
            appointment_id: req.appointment_id,
            check_in_time: req.check_in_time,
            notes: clean_text(req.notes),
        })
        .await?;
    Ok(Json(ApiOk::new(entry)))
}

/* ============================================================
   GET /queue
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListQueueQuery {
    pub status: Option<QueueStatus>,
    // check-in day, YYYY-MM-DD; omitted = every day
    pub date: Option<String>,
}

pub async fn list_queue(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<ListQueueQuery>, ApiError>,
) -> Result<Json<ApiOk<Vec<QueueEntry>>>, ApiError> {
    let mut filter = QueueFilter {
        status: q.status,
        ..Default::default()
    };
    if q.date.as_deref().is_some_and(|d| !d.trim().is_empty()) {
        let date = parse_date(q.date.as_deref(), "date", state.clinic_today())?;
        let (from, to) = day_window(date, state.clinic_offset)
            .ok_or_else(|| ApiError::date_out_of_range("date"))?;
        filter.checked_in_from = Some(from);
        filter.checked_in_to = Some(to);
    }

    let rows = state.queue().list(&filter).await?;
    Ok(Json(ApiOk::new(rows)))
}

/* ============================================================
   GET /queue/stats/weekly
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct WeeklyQuery {
    // any day of the wanted week; defaults to today
    pub date: Option<String>,
}

pub async fn get_weekly_completions(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<WeeklyQuery>, ApiError>,
) -> Result<Json<ApiOk<WeeklyCompletions>>, ApiError> {
    let date = parse_date(q.date.as_deref(), "date", state.clinic_today())?;
    let weekly = state.queue().weekly_completions(date).await?;
    Ok(Json(ApiOk::new(weekly)))
}

/* ============================================================
   GET / PATCH / DELETE /queue/{id}
   ============================================================ */

pub async fn get_queue_entry(
    State(state): State<AppState>,
    Path(queue_entry_id): Path<Uuid>,
) -> Result<Json<ApiOk<QueueEntry>>, ApiError> {
    let entry = state.queue().get(queue_entry_id).await?;
    Ok(Json(ApiOk::new(entry)))
}

#[derive(Debug, Deserialize)]
pub struct PatchQueueEntryRequest {
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub assigned_staff_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub notes: Option<Option<String>>,
}

pub async fn patch_queue_entry(
    State(state): State<AppState>,
    Path(queue_entry_id): Path<Uuid>,
    WithRejection(Json(req), _): JsonBody<PatchQueueEntryRequest>,
) -> Result<Json<ApiOk<QueueEntry>>, ApiError> {
    let changes = QueueChanges {
        assigned_staff_id: req.assigned_staff_id,
        notes: req.notes.map(clean_text),
    };
    let entry = state.queue().update(queue_entry_id, changes).await?;
    Ok(Json(ApiOk::new(entry)))
}

pub async fn dequeue(
    State(state): State<AppState>,
    Path(queue_entry_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    state.queue().dequeue(queue_entry_id).await?;
    Ok(Json(ApiOk::new(OkData { ok: true })))
}

/* ============================================================
   POST /queue/{id}/status
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct QueueStatusRequest {
    pub status: QueueStatus,
}

pub async fn set_queue_status(
    State(state): State<AppState>,
    Path(queue_entry_id): Path<Uuid>,
    WithRejection(Json(req), _): JsonBody<QueueStatusRequest>,
) -> Result<Json<ApiOk<QueueEntry>>, ApiError> {
    let entry = state
        .queue()
        .set_status(queue_entry_id, req.status)
        .await?;
    Ok(Json(ApiOk::new(entry)))
}

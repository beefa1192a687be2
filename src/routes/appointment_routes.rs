// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{clean_text, deserialize_double_option, parse_date, JsonBody};
use crate::{
    error::ApiError,
    models::{ApiOk, AppState, Appointment, AppointmentStatus, NewAppointment, OkData},
    services::{
        calendar::{day_window, week_window, WeekWindow},
        scheduling::AppointmentChanges,
    },
    store::AppointmentFilter,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(create_appointment).get(list_appointments))
        .route("/appointments/day", get(get_appointments_day))
        .route("/appointments/week", get(get_appointments_week))
        .route("/appointments/conflicts", post(check_conflict))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .patch(patch_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/status", post(set_appointment_status))
}

/* ============================================================
   Query params
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub practitioner_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    // YYYY-MM-DD on the clinic's wall clock; defaults to today
    pub date: Option<String>,
    pub practitioner_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct WeekAppointments {
    #[serde(flatten)]
    pub week: WeekWindow,
    pub appointments: Vec<Appointment>,
}

/* ============================================================
   GET /appointments
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<ListQuery>, ApiError>,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let filter = AppointmentFilter {
        practitioner_id: q.practitioner_id,
        patient_id: q.patient_id,
        status: q.status,
        from: q.from,
        to: q.to,
    };
    let rows = state.scheduling().list(&filter).await?;
    Ok(Json(ApiOk::new(rows)))
}

/* ============================================================
   GET /appointments/day, /appointments/week
   ============================================================ */

pub async fn get_appointments_day(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<CalendarQuery>, ApiError>,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let date = parse_date(q.date.as_deref(), "date", state.clinic_today())?;
    let (from, to) =
        day_window(date, state.clinic_offset).ok_or_else(|| ApiError::date_out_of_range("date"))?;

    let filter = AppointmentFilter {
        practitioner_id: q.practitioner_id,
        from: Some(from),
        to: Some(to),
        ..Default::default()
    };
    let rows = state.scheduling().list(&filter).await?;
    Ok(Json(ApiOk::new(rows)))
}

pub async fn get_appointments_week(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<CalendarQuery>, ApiError>,
) -> Result<Json<ApiOk<WeekAppointments>>, ApiError> {
    let date = parse_date(q.date.as_deref(), "date", state.clinic_today())?;
    let week =
        week_window(date, state.clinic_offset).ok_or_else(|| ApiError::date_out_of_range("date"))?;

    let filter = AppointmentFilter {
        practitioner_id: q.practitioner_id,
        from: Some(week.start),
        to: Some(week.end),
        ..Default::default()
    };
    let appointments = state.scheduling().list(&filter).await?;
    Ok(Json(ApiOk::new(WeekAppointments { week, appointments })))
}

/* ============================================================
   POST /appointments/conflicts
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ConflictCheckRequest {
    pub practitioner_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
}

pub async fn check_conflict(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<ConflictCheckRequest>,
) -> Result<Json<ApiOk<ConflictCheckResponse>>, ApiError> {
    let has_conflict = state
        .scheduling()
        .check_conflict(
            req.practitioner_id,
            req.start_at,
            req.end_at,
            req.exclude_appointment_id,
        )
        .await?;
    Ok(Json(ApiOk::new(ConflictCheckResponse { has_conflict })))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appointment = state.scheduling().get(appointment_id).await?;
    Ok(Json(ApiOk::new(appointment)))
}

/* ============================================================
   POST /appointments (create)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub practitioner_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub notes: Option<String>,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<CreateAppointmentRequest>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appointment = state
        .scheduling()
        .create(NewAppointment {
            patient_id: req.patient_id,
            practitioner_id: req.practitioner_id,
            start_at: req.start_at,
            end_at: req.end_at,
            notes: clean_text(req.notes),
        })
        .await?;
    Ok(Json(ApiOk::new(appointment)))
}

/* ============================================================
   PATCH /appointments/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatchAppointmentRequest {
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub practitioner_id: Option<Option<Uuid>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub notes: Option<Option<String>>,
}

pub async fn patch_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    WithRejection(Json(req), _): JsonBody<PatchAppointmentRequest>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let changes = AppointmentChanges {
        practitioner_id: req.practitioner_id,
        start_at: req.start_at,
        end_at: req.end_at,
        status: req.status,
        notes: req.notes.map(clean_text),
    };
    let appointment = state.scheduling().update(appointment_id, changes).await?;
    Ok(Json(ApiOk::new(appointment)))
}

/* ============================================================
   Status transitions
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: AppointmentStatus,
}

pub async fn set_appointment_status(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    WithRejection(Json(req), _): JsonBody<StatusRequest>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appointment = state
        .scheduling()
        .set_status(appointment_id, req.status)
        .await?;
    Ok(Json(ApiOk::new(appointment)))
}

/* ============================================================
   DELETE /appointments/{id}
   ============================================================ */

pub async fn delete_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    state.scheduling().delete(appointment_id).await?;
    Ok(Json(ApiOk::new(OkData { ok: true })))
}

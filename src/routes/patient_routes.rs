// src/routes/patient_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use super::{clean_text, JsonBody};
use crate::{
    error::{ApiError, FieldErrors},
    models::{ApiOk, AppState, NewPatient, Patient},
    store::DirectoryStore,
};

const MAX_NAME_LEN: usize = 100;
const SEARCH_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<chrono::NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", post(create_patient).get(search_patients))
        .route("/patients/{patient_id}", get(get_patient))
}

pub async fn create_patient(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<CreatePatientRequest>,
) -> Result<Json<ApiOk<Patient>>, ApiError> {
    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    let email = clean_text(req.email);

    let mut v = FieldErrors::new();
    v.check(!first_name.is_empty(), "first_name", "first_name is required")
        .check(first_name.len() <= MAX_NAME_LEN, "first_name", "first_name is too long (max 100)")
        .check(!last_name.is_empty(), "last_name", "last_name is required")
        .check(last_name.len() <= MAX_NAME_LEN, "last_name", "last_name is too long (max 100)")
        .check(
            email.as_deref().is_none_or(|e| e.contains('@')),
            "email",
            "email is not valid",
        );
    v.finish()?;

    let patient = state
        .store
        .insert_patient(NewPatient {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            phone: clean_text(req.phone),
            email,
            birthday: req.birthday,
        })
        .await?;

    tracing::info!(patient_id = %patient.patient_id, "patient created");
    Ok(Json(ApiOk::new(patient)))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Patient>>, ApiError> {
    let patient = state
        .store
        .patient(patient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("patient"))?;

    Ok(Json(ApiOk::new(patient)))
}

pub async fn search_patients(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<SearchQuery>, ApiError>,
) -> Result<Json<ApiOk<Vec<Patient>>>, ApiError> {
    // empty query = most recent
    let query = q.query.unwrap_or_default().trim().to_string();
    let search = (!query.is_empty()).then_some(query.as_str());

    let rows = state.store.patients(search, SEARCH_LIMIT).await?;
    Ok(Json(ApiOk::new(rows)))
}

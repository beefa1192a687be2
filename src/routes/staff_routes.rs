// src/routes/staff_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use super::JsonBody;
use crate::{
    error::{ApiError, FieldErrors},
    models::{ApiOk, AppState, NewStaff, Staff, StaffRole},
    store::DirectoryStore,
};

#[derive(Debug, Deserialize)]
pub struct CreateStaffRequest {
    pub display_name: String,
    pub role: StaffRole,
}

#[derive(Debug, Deserialize)]
pub struct ListStaffQuery {
    pub include_inactive: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        // /api/v1/staff
        .route("/staff", post(create_staff).get(list_staff))
        // /api/v1/staff/{staff_id}
        .route("/staff/{staff_id}", get(get_staff))
}

pub async fn create_staff(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<CreateStaffRequest>,
) -> Result<Json<ApiOk<Staff>>, ApiError> {
    let display_name = req.display_name.trim();

    let mut v = FieldErrors::new();
    v.check(!display_name.is_empty(), "display_name", "display_name is required")
        .check(display_name.len() <= 128, "display_name", "display_name is too long (max 128)");
    v.finish()?;

    let staff = state
        .store
        .insert_staff(NewStaff {
            display_name: display_name.to_string(),
            role: req.role,
        })
        .await?;

    tracing::info!(staff_id = %staff.staff_id, role = ?staff.role, "staff member created");
    Ok(Json(ApiOk::new(staff)))
}

pub async fn list_staff(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<ListStaffQuery>, ApiError>,
) -> Result<Json<ApiOk<Vec<Staff>>>, ApiError> {
    let rows = state.store.staff(q.include_inactive.unwrap_or(false)).await?;
    Ok(Json(ApiOk::new(rows)))
}

pub async fn get_staff(
    State(state): State<AppState>,
    Path(staff_id): Path<Uuid>,
) -> Result<Json<ApiOk<Staff>>, ApiError> {
    let staff = state
        .store
        .staff_member(staff_id)
        .await?
        .ok_or_else(|| ApiError::not_found("staff member"))?;

    Ok(Json(ApiOk::new(staff)))
}

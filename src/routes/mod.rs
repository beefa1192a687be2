use crate::error::ApiError;
use crate::models::AppState;
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use chrono::NaiveDate;
use serde::de::{Deserialize, Deserializer};

pub mod appointment_routes;
pub mod dashboard_routes;
pub mod patient_routes;
pub mod queue_routes;
pub mod staff_routes;

/// JSON body whose rejections render as [`ApiError`].
pub type JsonBody<T> = WithRejection<Json<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(patient_routes::router())
        .merge(staff_routes::router())
        .merge(appointment_routes::router())
        .merge(queue_routes::router())
        .merge(dashboard_routes::router());

    Router::new()
        .nest("/api/v1", api)
        .merge(dashboard_routes::health_router())
        .with_state(state)
}

/// For PATCH bodies: absent => None, `null` => Some(None), value => Some(Some(v)).
/// Use together with `#[serde(default)]`.
pub(crate) fn deserialize_double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    // Only called when the field is present (even if it's `null`).
    let inner = Option::<T>::deserialize(deserializer)?;
    Ok(Some(inner))
}

/// Parses an optional `YYYY-MM-DD` query value, falling back to `default`.
pub(crate) fn parse_date(
    raw: Option<&str>,
    field: &'static str,
    default: NaiveDate,
) -> Result<NaiveDate, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ApiError::invalid_field(field, format!("{field} must be YYYY-MM-DD"))),
    }
}

/// Trims free text; blank becomes `None`.
pub(crate) fn clean_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

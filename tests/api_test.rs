use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Datelike, Offset, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use dental_admin::{models::AppState, routes};

fn app() -> Router {
    routes::router(AppState::in_memory(Utc.fix()))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_patient(app: &Router, first: &str, last: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/patients",
        Some(json!({ "first_name": first, "last_name": last })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["patient_id"].as_str().unwrap().to_string()
}

async fn create_dentist(app: &Router, name: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/staff",
        Some(json!({ "display_name": name, "role": "dentist" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["staff_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_outside_the_api_prefix() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "data": { "status": "ok" } }));
}

#[tokio::test]
async fn overlapping_appointment_is_rejected() {
    let app = app();
    let patient = create_patient(&app, "Ada", "Lovelace").await;
    let other = create_patient(&app, "Alan", "Turing").await;
    let dentist = create_dentist(&app, "Dr. Molar").await;

    let (status, first) = call(
        &app,
        Method::POST,
        "/api/v1/appointments",
        Some(json!({
            "patient_id": patient,
            "practitioner_id": dentist,
            "start_at": "2026-03-02T09:00:00Z",
            "end_at": "2026-03-02T10:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["success"], true);
    assert_eq!(first["data"]["status"], "scheduled");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/appointments",
        Some(json!({
            "patient_id": other,
            "practitioner_id": dentist,
            "start_at": "2026-03-02T09:30:00Z",
            "end_at": "2026-03-02T10:30:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "APPOINTMENT_CONFLICT");

    // back-to-back is fine
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/appointments",
        Some(json!({
            "patient_id": other,
            "practitioner_id": dentist,
            "start_at": "2026-03-02T10:00:00Z",
            "end_at": "2026-03-02T10:30:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cancelling_frees_the_slot() {
    let app = app();
    let patient = create_patient(&app, "Ada", "Lovelace").await;
    let dentist = create_dentist(&app, "Dr. Molar").await;
    let slot = json!({
        "patient_id": patient,
        "practitioner_id": dentist,
        "start_at": "2026-03-03T14:00:00Z",
        "end_at": "2026-03-03T15:00:00Z",
    });

    let (_, created) = call(&app, Method::POST, "/api/v1/appointments", Some(slot.clone())).await;
    let id = created["data"]["appointment_id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/appointments/conflicts",
        Some(json!({
            "practitioner_id": dentist,
            "start_at": "2026-03-03T14:30:00Z",
            "end_at": "2026-03-03T14:45:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["has_conflict"], true);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/appointments/{id}/status"),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, _) = call(&app, Method::POST, "/api/v1/appointments", Some(slot)).await;
    assert_eq!(status, StatusCode::OK);

    // cancelled is terminal
    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/appointments/{id}/status"),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATUS_TRANSITION");
}

#[tokio::test]
async fn inverted_interval_reports_field_details() {
    let app = app();
    let patient = create_patient(&app, "Ada", "Lovelace").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/appointments",
        Some(json!({
            "patient_id": patient,
            "start_at": "2026-03-02T10:00:00Z",
            "end_at": "2026-03-02T09:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"][0]["field"], "end_at");
}

#[tokio::test]
async fn patient_validation_collects_every_field() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/patients",
        Some(json!({ "first_name": " ", "last_name": "", "email": "nope" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["first_name", "last_name", "email"]);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/patients",
        Some(json!({ "first_name": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_BODY");
}

#[tokio::test]
async fn unknown_ids_are_404() {
    let app = app();
    let missing = "00000000-0000-4000-8000-000000000000";

    for uri in [
        format!("/api/v1/patients/{missing}"),
        format!("/api/v1/staff/{missing}"),
        format!("/api/v1/appointments/{missing}"),
        format!("/api/v1/queue/{missing}"),
    ] {
        let (status, body) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["code"], "NOT_FOUND");
    }

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/queue",
        Some(json!({ "patient_id": missing })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patient_cannot_be_queued_twice() {
    let app = app();
    let patient = create_patient(&app, "Grace", "Hopper").await;
    let check_in = json!({ "patient_id": patient });

    let (status, first) = call(&app, Method::POST, "/api/v1/queue", Some(check_in.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["status"], "waiting");
    let entry = first["data"]["queue_entry_id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::POST, "/api/v1/queue", Some(check_in.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_IN_QUEUE");

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/queue/{entry}/status"),
        Some(json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["completed_at"].is_string());

    // finished visits don't block a new check-in
    let (status, _) = call(&app, Method::POST, "/api/v1/queue", Some(check_in)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn weekly_stats_count_todays_completions() {
    let app = app();
    let patient = create_patient(&app, "Katherine", "Johnson").await;

    let (_, entry) = call(
        &app,
        Method::POST,
        "/api/v1/queue",
        Some(json!({ "patient_id": patient })),
    )
    .await;
    let id = entry["data"]["queue_entry_id"].as_str().unwrap().to_string();

    for status in ["in_treatment", "completed"] {
        let (code, _) = call(
            &app,
            Method::POST,
            &format!("/api/v1/queue/{id}/status"),
            Some(json!({ "status": status })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }

    let today = Utc::now().date_naive();
    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/queue/stats/weekly?date={today}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let data = &body["data"];
    assert_eq!(data["labels"][0], "Mon");
    assert_eq!(data["total"], 1);
    let bucket = today.weekday().num_days_from_monday() as usize;
    assert_eq!(data["counts"][bucket], 1);
    assert!(data.get("start").is_none());
}

#[tokio::test]
async fn bad_date_query_is_rejected() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/queue/stats/weekly?date=03/02/2026",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn dashboard_reflects_queue() {
    let app = app();
    let a = create_patient(&app, "Ada", "Lovelace").await;
    let b = create_patient(&app, "Alan", "Turing").await;

    call(&app, Method::POST, "/api/v1/queue", Some(json!({ "patient_id": a }))).await;
    let (_, entry) = call(&app, Method::POST, "/api/v1/queue", Some(json!({ "patient_id": b }))).await;
    let id = entry["data"]["queue_entry_id"].as_str().unwrap().to_string();
    call(
        &app,
        Method::POST,
        &format!("/api/v1/queue/{id}/status"),
        Some(json!({ "status": "in_treatment" })),
    )
    .await;

    let (status, body) = call(&app, Method::GET, "/api/v1/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["waiting"], 1);
    assert_eq!(body["data"]["in_treatment"], 1);
    assert_eq!(body["data"]["completed_today"], 0);
}

#[tokio::test]
async fn patient_search_matches_full_name() {
    let app = app();
    create_patient(&app, "Ada", "Lovelace").await;
    create_patient(&app, "Alan", "Turing").await;

    let (status, body) = call(&app, Method::GET, "/api/v1/patients?query=ada%20love", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["last_name"], "Lovelace");

    let (_, body) = call(&app, Method::GET, "/api/v1/patients", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn dates_past_the_calendar_edge_are_validation_errors() {
    let app = app();
    let last_day = "%2B262142-12-31";

    for uri in [
        format!("/api/v1/queue/stats/weekly?date={last_day}"),
        format!("/api/v1/appointments/day?date={last_day}"),
        format!("/api/v1/appointments/week?date={last_day}"),
        format!("/api/v1/queue?date={last_day}"),
    ] {
        let (status, body) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], "VALIDATION_ERROR", "{uri}");
        assert_eq!(body["details"][0]["field"], "date", "{uri}");
    }
}

#[tokio::test]
async fn dashboard_counts_only_active_appointments_today() {
    let app = app();
    let patient = create_patient(&app, "Ada", "Lovelace").await;
    let dentist = create_dentist(&app, "Dr. Molar").await;
    let today = Utc::now().date_naive();

    let mut ids = Vec::new();
    for (start, end) in [("08:00", "08:30"), ("09:00", "09:30"), ("10:00", "10:30")] {
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/appointments",
            Some(json!({
                "patient_id": patient,
                "practitioner_id": dentist,
                "start_at": format!("{today}T{start}:00Z"),
                "end_at": format!("{today}T{end}:00Z"),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        ids.push(body["data"]["appointment_id"].as_str().unwrap().to_string());
    }

    for (id, status) in [(&ids[0], "cancelled"), (&ids[1], "confirmed")] {
        let (code, _) = call(
            &app,
            Method::POST,
            &format!("/api/v1/appointments/{id}/status"),
            Some(json!({ "status": status })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }

    let (status, body) = call(&app, Method::GET, "/api/v1/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["appointments_today"], 2);
    assert_eq!(body["data"]["date"], today.to_string());
}

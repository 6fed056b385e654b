use std::future::Future;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    application::state::SharedState,
    domain::{
        error::DomainError,
        models::{MedicationUpdate, NewMedication, ReportType, UserRecord},
    },
    storage::now_unix_ms,
};

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/users", post(upsert_user_handler))
        .route("/sessions", post(put_session_handler))
        .route("/sessions/{session_id}/user", get(session_user_handler))
        .route("/medications", post(create_medication_handler))
        .route(
            "/users/{user_id}/medications",
            get(list_medications_handler),
        )
        .route(
            "/medications/{medication_id}",
            patch(update_medication_handler).delete(delete_medication_handler),
        )
        .route(
            "/medications/{medication_id}/taken",
            post(mark_taken_handler),
        )
        .route(
            "/medications/{medication_id}/next-reminder",
            get(next_reminder_handler),
        )
        .route("/users/{user_id}/logs", get(list_logs_handler))
        .route("/reports", post(request_report_handler))
        .route("/users/{user_id}/reports", get(list_reports_handler))
        .route("/users/{user_id}/deliveries", get(list_deliveries_handler))
        .route("/exports/{export_id}", get(download_export_handler))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DomainError> {
    let local_addr = listener.local_addr().map_err(|error| {
        DomainError::Unavailable(format!("failed to read listener address: {error}"))
    })?;

    info!(
        "remedi-core listening on http://{}:{}",
        local_addr.ip(),
        local_addr.port(),
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|error| DomainError::Unavailable(format!("server runtime error: {error}")))
}

fn error_response(error: &DomainError) -> Response {
    let status = match error {
        DomainError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Unauthorized(_) => StatusCode::FORBIDDEN,
        DomainError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "ok": false,
            "error": error.to_string(),
        })),
    )
        .into_response()
}

async fn healthz_handler(State(state): State<SharedState>) -> Response {
    match state.health_payload().await {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ok": false,
                "error": error.to_string(),
            })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertUserRequest {
    #[serde(default)]
    id: Option<String>,
    name: String,
    email: String,
}

async fn upsert_user_handler(
    State(state): State<SharedState>,
    Json(request): Json<UpsertUserRequest>,
) -> Response {
    if request.name.trim().is_empty() || request.email.trim().is_empty() {
        return error_response(&DomainError::InvalidRequest(
            "user requires a name and an email".to_owned(),
        ));
    }

    let user = UserRecord {
        id: request
            .id
            .unwrap_or_else(|| format!("user-{}", uuid::Uuid::new_v4())),
        name: request.name,
        email: request.email,
        created_at_ms: now_unix_ms(),
    };
    match state.upsert_user(&user).await {
        Ok(()) => (StatusCode::OK, Json(user)).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutSessionRequest {
    session_id: String,
    user_id: String,
}

async fn put_session_handler(
    State(state): State<SharedState>,
    Json(request): Json<PutSessionRequest>,
) -> Response {
    match state
        .put_session(&request.session_id, &request.user_id)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))).into_response(),
        Err(error) => error_response(&error),
    }
}

async fn session_user_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.find_user_by_session(&session_id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(user)).into_response(),
        Ok(None) => error_response(&DomainError::NotFound(format!(
            "session not found: {session_id}"
        ))),
        Err(error) => error_response(&error),
    }
}

async fn create_medication_handler(
    State(state): State<SharedState>,
    Json(request): Json<NewMedication>,
) -> Response {
    match state.create_medication(request).await {
        Ok(medication) => (StatusCode::CREATED, Json(medication)).into_response(),
        Err(error) => error_response(&error),
    }
}

async fn list_medications_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.list_medications(&user_id).await {
        Ok(medications) => (StatusCode::OK, Json(medications)).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMedicationRequest {
    user_id: String,
    #[serde(flatten)]
    update: MedicationUpdate,
}

async fn update_medication_handler(
    State(state): State<SharedState>,
    Path(medication_id): Path<String>,
    Json(request): Json<UpdateMedicationRequest>,
) -> Response {
    match state
        .update_medication(&medication_id, &request.user_id, request.update)
        .await
    {
        Ok(medication) => (StatusCode::OK, Json(medication)).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: String,
}

async fn delete_medication_handler(
    State(state): State<SharedState>,
    Path(medication_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Response {
    match state
        .delete_medication(&medication_id, &query.user_id)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkTakenRequest {
    user_id: String,
    #[serde(default)]
    notes: Option<String>,
}

async fn mark_taken_handler(
    State(state): State<SharedState>,
    Path(medication_id): Path<String>,
    Json(request): Json<MarkTakenRequest>,
) -> Response {
    match state
        .mark_medication_taken(&medication_id, &request.user_id, request.notes)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))).into_response(),
        Err(error) => error_response(&error),
    }
}

async fn next_reminder_handler(
    State(state): State<SharedState>,
    Path(medication_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Response {
    match state.next_reminder_at(&medication_id, &query.user_id).await {
        Ok(next) => (
            StatusCode::OK,
            Json(json!({ "nextReminderAtMs": next })),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogWindowQuery {
    #[serde(default)]
    start_ms: Option<u64>,
    #[serde(default)]
    end_ms: Option<u64>,
}

async fn list_logs_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Query(query): Query<LogWindowQuery>,
) -> Response {
    match state
        .list_medication_logs(&user_id, query.start_ms, query.end_ms)
        .await
    {
        Ok(logs) => (StatusCode::OK, Json(logs)).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestReportRequest {
    user_id: String,
    report_type: ReportType,
    #[serde(default)]
    start_date_ms: Option<u64>,
    #[serde(default)]
    end_date_ms: Option<u64>,
}

async fn request_report_handler(
    State(state): State<SharedState>,
    Json(request): Json<RequestReportRequest>,
) -> Response {
    match state
        .request_report(
            &request.user_id,
            request.report_type,
            request.start_date_ms,
            request.end_date_ms,
        )
        .await
    {
        Ok(report) => (StatusCode::ACCEPTED, Json(report)).into_response(),
        Err(error) => error_response(&error),
    }
}

async fn list_reports_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.list_reports(&user_id).await {
        Ok(reports) => (StatusCode::OK, Json(reports)).into_response(),
        Err(error) => error_response(&error),
    }
}

async fn list_deliveries_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.list_deliveries(&user_id).await {
        Ok(messages) => (StatusCode::OK, Json(messages)).into_response(),
        Err(error) => error_response(&error),
    }
}

async fn download_export_handler(
    State(state): State<SharedState>,
    Path(export_id): Path<String>,
) -> Response {
    match state.read_export(&export_id).await {
        Ok(Some(contents)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            contents,
        )
            .into_response(),
        Ok(None) => error_response(&DomainError::NotFound(format!(
            "export not found: {export_id}"
        ))),
        Err(error) => error_response(&error),
    }
}

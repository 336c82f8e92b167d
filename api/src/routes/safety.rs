use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trace_core::error::ApiError;
use trace_core::safety::{
    CRISIS_WINDOW_MINUTES, CrisisSnapshot, EXIT_CHECK_IN_AFTER, MIN_MINUTES_TO_EXIT, MarkOutcome,
    MessageVerdict, SAFE_MESSAGES_TO_EXIT,
};

use crate::auth::ServiceAuth;
use crate::error::AppError;
use crate::safety::tracker;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/safety/config", get(get_safety_config))
        .route("/v1/safety/{user_id}/state", get(get_state))
        .route("/v1/safety/{user_id}/window", get(check_window))
        .route("/v1/safety/{user_id}/message", post(record_message))
        .route("/v1/safety/{user_id}/crisis", post(mark_crisis))
}

/// Request to flag a user in crisis from an explicit detection site.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MarkCrisisRequest {
    /// Where the distress was detected (default "chat")
    #[serde(default)]
    pub source: Option<String>,
    /// Why it was flagged (default "distress")
    #[serde(default)]
    pub tag: Option<String>,
}

/// Request carrying the upstream classifier's verdict for one message.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RecordMessageRequest {
    /// Whether the classifier marked this message as highly distressed
    pub distressed: bool,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct WindowQuery {
    /// Window length override in minutes (default 90)
    #[serde(default)]
    pub window_minutes: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WindowCheckResponse {
    pub in_window: bool,
}

/// The fixed policy parameters, so the chat service can render copy about
/// the step-down rules without duplicating the numbers.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SafetyConfigResponse {
    pub crisis_window_minutes: i64,
    pub safe_messages_to_exit: i32,
    pub min_minutes_to_exit: i64,
    pub exit_check_in_after: i32,
}

/// Free-text labels are stored verbatim; keep them short and non-empty.
fn validate_label(field: &str, value: Option<&str>) -> Result<(), AppError> {
    let Some(value) = value else { return Ok(()) };

    if value.is_empty() {
        return Err(AppError::Validation {
            message: format!("{field} must not be empty when provided"),
            field: Some(field.to_string()),
            received: None,
            docs_hint: Some(format!("Omit {field} to use its default value.")),
        });
    }

    if value.len() > 64 {
        return Err(AppError::Validation {
            message: format!("{field} must be at most 64 characters"),
            field: Some(field.to_string()),
            received: Some(serde_json::Value::String(value.to_string())),
            docs_hint: Some("Use a short label like 'chat' or 'self-harm-language'.".to_string()),
        });
    }

    Ok(())
}

/// Get the fixed safety policy parameters
#[utoipa::path(
    get,
    path = "/v1/safety/config",
    responses(
        (status = 200, description = "Policy parameters", body = SafetyConfigResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "safety"
)]
pub async fn get_safety_config(_auth: ServiceAuth) -> Json<SafetyConfigResponse> {
    Json(SafetyConfigResponse {
        crisis_window_minutes: CRISIS_WINDOW_MINUTES,
        safe_messages_to_exit: SAFE_MESSAGES_TO_EXIT,
        min_minutes_to_exit: MIN_MINUTES_TO_EXIT,
        exit_check_in_after: EXIT_CHECK_IN_AFTER,
    })
}

/// Get a user's full crisis state
///
/// Degrades to the all-default inactive state when the store is
/// unreachable; this endpoint never fails into the chat flow.
#[utoipa::path(
    get,
    path = "/v1/safety/{user_id}/state",
    params(
        ("user_id" = Uuid, Path, description = "User to look up")
    ),
    responses(
        (status = 200, description = "Current crisis state", body = CrisisSnapshot),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "safety"
)]
pub async fn get_state(
    State(state): State<AppState>,
    _auth: ServiceAuth,
    Path(user_id): Path<Uuid>,
) -> Json<CrisisSnapshot> {
    Json(tracker::get_crisis_state(&state.db, user_id, Utc::now()).await)
}

/// Check whether a user is inside the crisis window
///
/// Accepts an optional window override for callers with their own follow-up
/// cadence (e.g. the next-morning check-in job).
#[utoipa::path(
    get,
    path = "/v1/safety/{user_id}/window",
    params(
        ("user_id" = Uuid, Path, description = "User to look up"),
        WindowQuery
    ),
    responses(
        (status = 200, description = "Window membership", body = WindowCheckResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "safety"
)]
pub async fn check_window(
    State(state): State<AppState>,
    _auth: ServiceAuth,
    Path(user_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<WindowCheckResponse>, AppError> {
    let window_minutes = query.window_minutes.unwrap_or(CRISIS_WINDOW_MINUTES);
    if window_minutes < 1 {
        return Err(AppError::Validation {
            message: "window_minutes must be at least 1".to_string(),
            field: Some("window_minutes".to_string()),
            received: Some(serde_json::json!(window_minutes)),
            docs_hint: Some("Omit window_minutes to use the default of 90.".to_string()),
        });
    }

    let in_window =
        tracker::is_in_crisis_window(&state.db, user_id, window_minutes, Utc::now()).await;
    Ok(Json(WindowCheckResponse { in_window }))
}

/// Record one inbound message's classifier verdict
///
/// The per-message state machine: a distressed message (re)opens the
/// window, a safe one counts toward the early exit. Always answers 200;
/// storage trouble degrades to the inactive verdict and is logged.
#[utoipa::path(
    post,
    path = "/v1/safety/{user_id}/message",
    params(
        ("user_id" = Uuid, Path, description = "User the message belongs to")
    ),
    request_body = RecordMessageRequest,
    responses(
        (status = 200, description = "Updated verdict", body = MessageVerdict),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "safety"
)]
pub async fn record_message(
    State(state): State<AppState>,
    _auth: ServiceAuth,
    Path(user_id): Path<Uuid>,
    Json(req): Json<RecordMessageRequest>,
) -> Json<MessageVerdict> {
    Json(tracker::update_after_message(&state.db, user_id, req.distressed, Utc::now()).await)
}

/// Flag a user in crisis from an explicit detection site
///
/// Used by detection points other than the chat classifier (e.g. journal
/// analysis). `persisted: false` means the write failed and was logged.
#[utoipa::path(
    post,
    path = "/v1/safety/{user_id}/crisis",
    params(
        ("user_id" = Uuid, Path, description = "User to flag")
    ),
    request_body = MarkCrisisRequest,
    responses(
        (status = 200, description = "Write outcome", body = MarkOutcome),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "safety"
)]
pub async fn mark_crisis(
    State(state): State<AppState>,
    _auth: ServiceAuth,
    Path(user_id): Path<Uuid>,
    Json(req): Json<MarkCrisisRequest>,
) -> Result<Json<MarkOutcome>, AppError> {
    validate_label("source", req.source.as_deref())?;
    validate_label("tag", req.tag.as_deref())?;

    let outcome = tracker::mark_in_crisis(
        &state.db,
        user_id,
        req.source.as_deref(),
        req.tag.as_deref(),
        Utc::now(),
    )
    .await;

    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::validate_label;

    #[test]
    fn absent_labels_pass_validation() {
        assert!(validate_label("source", None).is_ok());
    }

    #[test]
    fn empty_and_oversized_labels_are_rejected() {
        assert!(validate_label("source", Some("")).is_err());
        assert!(validate_label("tag", Some(&"x".repeat(65))).is_err());
        assert!(validate_label("tag", Some("self-harm-language")).is_ok());
    }
}

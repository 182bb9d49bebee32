//! REST endpoints for survey submission.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::schema::{FieldError, validate_payload};
use crate::store::Database;

/// Shared state for the survey routes.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<dyn Database>,
}

/// Build the survey REST routes with a permissive CORS layer.
pub fn survey_routes(db: Arc<dyn Database>) -> Router {
    Router::new()
        .route("/api/survey", get(describe_survey).post(submit_survey))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(ApiState { db })
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "survey-wizard"
    }))
}

// ── Survey ──────────────────────────────────────────────────────────────

/// GET /api/survey
async fn describe_survey() -> impl IntoResponse {
    Json(json!({
        "message": "Survey API endpoint",
        "methods": ["POST"],
        "description": "Submit survey data"
    }))
}

/// POST /api/survey
///
/// Validates the whole record, stores it as one document and returns the
/// new id. Every failing field is reported.
async fn submit_survey(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string()
    };
    let user_agent = header("user-agent");
    let forwarded_for = header("x-forwarded-for");

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Survey body is not valid JSON");
            return invalid(vec![FieldError::new("body", format!("Invalid JSON: {e}"))]);
        }
    };

    let submission = match validate_payload(&payload) {
        Ok(submission) => submission,
        Err(errors) => {
            warn!(fields = errors.len(), user_agent = %user_agent, "Survey rejected");
            return invalid(errors);
        }
    };

    match state.db.insert_survey(&submission).await {
        Ok(stored) => {
            info!(
                survey_id = %stored.id,
                traffic_source = %submission.traffic_source,
                user_agent = %user_agent,
                ip = %forwarded_for,
                "Survey submission stored"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Survey submitted successfully",
                    "id": stored.id
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to store survey submission");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Internal server error",
                    "error": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

fn invalid(errors: Vec<FieldError>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "message": "Invalid form data",
            "errors": errors
        })),
    )
        .into_response()
}

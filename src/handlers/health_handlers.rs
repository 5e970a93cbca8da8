//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that probes the metadata index and blob store

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Liveness probe. Always 200 and never touches storage.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs the `ping` of both storage collaborators. HTTP 200 when both pass,
/// HTTP 503 when either fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let (index_err, blobs_err) = state.files.readiness().await;
    let overall_ok = index_err.is_none() && blobs_err.is_none();

    let mut checks = HashMap::new();
    checks.insert(
        "index",
        CheckStatus {
            ok: index_err.is_none(),
            error: index_err,
        },
    );
    checks.insert(
        "blobs",
        CheckStatus {
            ok: blobs_err.is_none(),
            error: blobs_err,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

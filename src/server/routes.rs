//! HTTP routes
//!
//! - `GET /health` - liveness
//! - `GET /whoami` - echoes the verified token payload (gated)
//! - `POST /admin/revoke` - revoke every token of a subject (admin key)
//! - `POST /admin/grants/reload` - reload grants from the grant source (admin key)

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::Payload;
use crate::server::middleware::require_auth;
use crate::server::AppState;

/// Header carrying the admin key
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Create the router
pub fn create_router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/whoami", get(whoami_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_handler))
        .route("/admin/revoke", post(revoke_handler))
        .route("/admin/grants/reload", post(reload_grants_handler))
        .merge(gated)
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn whoami_handler(Extension(payload): Extension<Payload>) -> Json<Payload> {
    Json(payload)
}

#[derive(Debug, Deserialize)]
struct RevokeRequest {
    tenant_type: String,
    subject_id: String,
}

async fn revoke_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RevokeRequest>,
) -> Response {
    if let Err(denied) = check_admin(&state, &headers) {
        return denied;
    }

    let revoked_at = state
        .pipeline
        .revocations()
        .revoke_all(&body.tenant_type, &body.subject_id, state.clock.now());

    Json(json!({
        "tenant_type": body.tenant_type,
        "subject_id": body.subject_id,
        "revoked_at": revoked_at,
    }))
    .into_response()
}

async fn reload_grants_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denied) = check_admin(&state, &headers) {
        return denied;
    }

    let Some(source) = state.grant_source.as_ref() else {
        return error_response(StatusCode::CONFLICT, "no grant source configured");
    };

    match state.pipeline.grants().reload_from(source.as_ref()).await {
        Ok(snapshot) => {
            info!(grants = snapshot.len(), "Grants reloaded via admin endpoint");
            Json(json!({ "grants": snapshot.len() })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Grant reload failed, keeping previous snapshot");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn check_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(admin_key) = state.admin_key.as_ref() else {
        return Err(error_response(StatusCode::FORBIDDEN, "admin endpoints disabled"));
    };

    let presented = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if admin_key.matches(presented) {
        Ok(())
    } else {
        Err(error_response(StatusCode::UNAUTHORIZED, "invalid admin key"))
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

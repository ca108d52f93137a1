//! axum middleware running the gatekeeping pipeline
//!
//! Apply with `route_layer` so the matched route template is known:
//!
//! ```ignore
//! Router::new()
//!     .route("/articles/{id}", put(update_article))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
//! ```

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::pipeline::{AccessRequest, Rejection};
use crate::server::AppState;

const BEARER_SCHEME: &str = "Bearer ";

/// Extract the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_SCHEME)?.trim();
    (!token.is_empty()).then_some(token)
}

/// Gate a request through decode, revocation, grant and admission checks
///
/// On success the verified [`Payload`](crate::auth::Payload) is stored in the
/// request extensions.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let now = state.clock.now();
    let route = match request.extensions().get::<MatchedPath>() {
        Some(path) => path.as_str().to_owned(),
        None => request.uri().path().to_owned(),
    };

    let outcome = {
        let Some(bearer) = bearer_token(request.headers()) else {
            return missing_bearer();
        };
        let access = AccessRequest::new(bearer, &route, request.method().as_str());
        state.pipeline.authorize(&access, now)
    };

    match outcome {
        Ok(payload) => {
            request.extensions_mut().insert(payload);
            next.run(request).await
        }
        Err(rejection) => rejection_response(&rejection, now),
    }
}

fn missing_bearer() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "kind": "missing_bearer",
            "message": "bearer authorization header missing or malformed",
        })),
    )
        .into_response()
}

/// Map a rejection onto an HTTP response
pub fn rejection_response(rejection: &Rejection, now: DateTime<Utc>) -> Response {
    let status = match rejection {
        Rejection::MalformedToken
        | Rejection::TamperedToken
        | Rejection::ExpiredToken
        | Rejection::RevokedToken => StatusCode::UNAUTHORIZED,
        Rejection::Forbidden { .. } => StatusCode::FORBIDDEN,
        Rejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
    };

    let mut body = json!({
        "kind": rejection.kind(),
        "message": rejection.to_string(),
    });

    let mut response = match rejection {
        Rejection::RateLimited { until } => {
            body["resume_at"] = json!(until);
            let mut response = (status, Json(body)).into_response();
            let wait = (*until - now).num_milliseconds().max(0);
            // Round up so clients never retry early
            let seconds = (wait + 999) / 1000;
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        _ => (status, Json(body)).into_response(),
    };

    if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

//! API key authentication middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::ApiState;
use crate::relay::ProxyResponse;

/// Extract API key from Authorization header
fn extract_api_key(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Middleware to verify API key
///
/// With no key configured every request passes.
pub async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected_key) = &state.api_key else {
        return next.run(req).await;
    };

    match extract_api_key(&req) {
        Some(key) if key == expected_key => next.run(req).await,
        Some(_) => {
            tracing::warn!("invalid API key provided");
            unauthorized()
        }
        None => {
            tracing::debug!("no API key provided");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    ProxyResponse::error(StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

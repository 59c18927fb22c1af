//! Relay endpoint: `POST /api/service?endpoint=stt|tts`

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};

use super::{ApiState, auth::require_api_key};
use crate::relay::ProxyResponse;

/// Build relay router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/service", post(relay))
        // Audio uploads are not size-capped
        .layer(DefaultBodyLimit::disable())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

/// Forward the body to the operation named by `endpoint`
///
/// Always answers with JSON: the normalized upstream reply or
/// `{ "message": ... }`.
async fn relay(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> ProxyResponse {
    let endpoint = params.get("endpoint").map(String::as_str);
    state.dispatcher.relay(endpoint, body).await
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

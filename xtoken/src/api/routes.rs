//! The credential gate.

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;

use crate::api::error::ApiError;
use crate::api::server::AppState;

/// Query parameters in request order; repeated keys are kept.
type GateQuery = Vec<(String, String)>;

/// Create the application router.
///
/// `/` answers every method.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(issue_credentials))
        .with_state(state)
}

/// First value of the `token` parameter.
fn presented_token(query: &GateQuery) -> Option<&str> {
    query
        .iter()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.as_str())
}

/// Run one race and answer with `"<oauth_token>,<oauth_token_secret>"`.
///
/// A missing or wrong `token`, or an unparsable query, gets an empty 403
/// before any outbound call.
async fn issue_credentials(
    State(state): State<AppState>,
    query: Result<Query<GateQuery>, QueryRejection>,
) -> Response {
    let query = query.map(|Query(query)| query).unwrap_or_default();
    if !state.shared_secret.verify(presented_token(&query)) {
        tracing::warn!("Rejected request with invalid token");
        return StatusCode::FORBIDDEN.into_response();
    }

    match state.token_service.acquire().await {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "Credential request failed");
            ApiError::from(err).into_response()
        }
    }
}

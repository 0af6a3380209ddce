use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};

use crate::{adapters::http::app_state::AppState, app_error::AppResult};

pub fn router() -> Router<AppState> {
    Router::new().route("/providers", get(list_providers))
}

/// GET /api/providers
/// Configured gateways with the currencies and banks they support.
async fn list_providers(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(app_state.registry.summaries()))
}

pub mod health;
pub mod invoices;
pub mod providers;
pub mod webhooks;

use axum::Router;

use crate::adapters::http::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(webhooks::router())
        .nest("/invoices", invoices::router())
        .merge(providers::router())
}

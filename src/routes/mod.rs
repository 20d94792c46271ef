pub mod auth;
pub mod forum;
pub mod offers;
pub mod store;
pub mod users;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Assemble the application router. Shared by main and the HTTP tests.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(store::router())
        .merge(offers::router())
        .merge(users::router())
        .merge(forum::router())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

mod dto;
mod handlers;
mod state;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;

/// The representative HTTP surface of §6. Authentication/authorization is
/// an explicit out-of-core collaborator (§1, §6) — there is no auth layer
/// here for a caller outside the core to wire in.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/deployments", post(handlers::create_deployment).get(handlers::list_deployments))
        .route("/api/deployments/upload", post(handlers::create_upload_deployment))
        .route(
            "/api/deployments/:id",
            get(handlers::get_deployment).delete(handlers::cancel_deployment),
        )
        .route("/api/deployments/:id/logs", get(handlers::stream_logs))
        .route("/api/deployments/:id/logs/tail", get(handlers::get_logs))
        .route("/api/deployments/:id/rollback", post(handlers::rollback_deployment))
        .with_state(state)
}

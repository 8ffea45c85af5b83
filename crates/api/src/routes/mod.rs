pub mod executions;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                              WebSocket upgrade
/// /executions/{id}                 execution detail
/// /executions/{id}/start           begin processing
/// /executions/{id}/pause           block new admissions
/// /executions/{id}/resume          re-queue and continue
/// /executions/{id}/stop            terminal stop
/// /executions/{id}/concurrency     resize the limit
/// /executions/{id}/events          durable event history
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/executions", executions::router())
}

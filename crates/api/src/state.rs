use std::sync::Arc;

use siphon_agent::HttpExtractor;
use siphon_engine::{Orchestrator, PgStore};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: siphon_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Centralized event bus.
    pub event_bus: Arc<siphon_events::EventBus>,
    /// Execution lifecycle orchestrator.
    pub orchestrator: Orchestrator<PgStore, HttpExtractor>,
}

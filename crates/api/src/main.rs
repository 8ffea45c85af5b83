use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use siphon_agent::HttpExtractor;
use siphon_api::config::ServerConfig;
use siphon_api::router::build_app_router;
use siphon_api::state::AppState;
use siphon_api::ws;
use siphon_engine::{Orchestrator, PgStore};
use siphon_events::{EventBus, EventPersistence, EventRelay};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siphon_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = siphon_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    siphon_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    siphon_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- WebSocket manager + heartbeat ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Event bus and sinks ---
    let (history_tx, history_rx) = mpsc::unbounded_channel();
    let mut event_bus = EventBus::default().with_history_sink(history_tx);

    let relay = config
        .relay_channel
        .as_ref()
        .map(|channel| Arc::new(EventRelay::new(channel.clone())));
    let mut relay_rx = None;
    if relay.is_some() {
        let (tx, rx) = mpsc::unbounded_channel();
        event_bus = event_bus.with_relay_sink(tx);
        relay_rx = Some(rx);
    }
    let event_bus = Arc::new(event_bus);

    let persistence_handle = tokio::spawn(EventPersistence::run(
        pool.clone(),
        config.event_retention_days,
        history_rx,
    ));

    let background_cancel = tokio_util::sync::CancellationToken::new();
    let purge_handle = tokio::spawn(EventPersistence::run_purge(
        pool.clone(),
        background_cancel.clone(),
    ));

    let mut relay_handles = Vec::new();
    if let (Some(relay), Some(rx)) = (relay, relay_rx) {
        tracing::info!("Cross-process event relay enabled");
        let publisher = {
            let relay = Arc::clone(&relay);
            let pool = pool.clone();
            tokio::spawn(async move { relay.run_publisher(pool, rx).await })
        };
        let consumer = {
            let relay = Arc::clone(&relay);
            let pool = pool.clone();
            let bus = Arc::clone(&event_bus);
            let cancel = background_cancel.clone();
            tokio::spawn(async move { relay.run_consumer(pool, bus, cancel).await })
        };
        relay_handles.push(publisher);
        relay_handles.push(consumer);
    } else {
        tracing::info!("RELAY_CHANNEL not set, running in single-process mode");
    }

    // Forward every event to connected WebSocket clients.
    let forwarder_handle =
        ws::start_event_forwarder(Arc::clone(&event_bus), Arc::clone(&ws_manager));

    // --- Orchestrator ---
    let store = Arc::new(PgStore::new(pool.clone()));
    let extractor = Arc::new(HttpExtractor::new(
        config.agent_api_url.clone(),
        config.agent_ws_url.clone(),
    ));
    let orchestrator = Orchestrator::new(store, extractor, Arc::clone(&event_bus));

    // --- App state + router ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
        orchestrator,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop the purge loop and relay consumer.
    background_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), purge_handle).await;
    for handle in relay_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    // Drop the bus to close its channels; persistence and forwarder drain
    // and exit.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;
    tracing::info!("Event services shut down");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

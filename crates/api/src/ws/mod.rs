//! WebSocket infrastructure for real-time event delivery.
//!
//! Provides connection management, heartbeat monitoring with stale-client
//! reaping, the HTTP upgrade handler, and the bus-to-socket forwarder.

pub mod forwarder;
mod handler;
mod heartbeat;
pub mod manager;
pub mod protocol;

pub use forwarder::start_event_forwarder;
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;

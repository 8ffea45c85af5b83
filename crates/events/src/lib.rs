//! Execution event fan-out infrastructure.
//!
//! Building blocks for streaming every orchestrator state change to local
//! and remote observers:
//!
//! - [`ExecutionEvent`] / [`EventEnvelope`] — the typed event model and its
//!   wire envelope.
//! - [`EventBus`] — synchronous local broadcast plus non-blocking hand-off
//!   to the best-effort sinks.
//! - [`EventPersistence`] — background service writing every event to the
//!   `events` table with a retention expiry, plus the purge loop.
//! - [`EventRelay`] — cross-process fan-out over Postgres NOTIFY/LISTEN.

pub mod bus;
pub mod event;
pub mod persistence;
pub mod relay;

pub use bus::EventBus;
pub use event::{EventEnvelope, ExecutionEvent};
pub use persistence::EventPersistence;
pub use relay::EventRelay;

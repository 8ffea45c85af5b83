//! Execution engine: bounded-parallelism admission and the execution
//! lifecycle orchestrator.

pub mod limiter;
pub mod orchestrator;
pub mod pg;
pub mod store;

pub use limiter::ConcurrencyLimiter;
pub use orchestrator::{Orchestrator, OrchestratorError, TaskConfig};
pub use pg::PgStore;
pub use store::{ExecutionStore, StoreError, StoreResult};

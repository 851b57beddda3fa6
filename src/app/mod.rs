//! Application layer containing business logic and shared state.

pub mod services;
pub mod state;
pub mod worker;

pub use services::Caller;
pub use state::{AppState, AuthSettings, Integrations, Repositories};
pub use worker::{MaintenanceWorker, WorkerConfig, spawn_worker};

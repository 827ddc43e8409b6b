//! hoist-core — shared types for the Hoist migration orchestrator.
//!
//! Everything the scheduler and the executors have to agree on lives here:
//!
//! - **`labels`** — the flat key/value label protocol carried on every task
//! - **`types`** — operations, tasks, offers, and task status
//! - **`envelope`** — the transfer envelope moved through the exchange
//! - **`config`** — `hoist.toml` parsing

pub mod config;
pub mod envelope;
pub mod error;
pub mod labels;
pub mod types;

pub use config::{AgentConfig, HoistConfig, SchedulerConfig};
pub use envelope::{ContainerSpec, TransferEnvelope};
pub use error::{CoreError, CoreResult};
pub use labels::{Label, Labels};
pub use types::*;

//! hoist-cluster — scheduler/host transport for Hoist.
//!
//! Carries offers, dispatched tasks, and task statuses between the
//! scheduler and the worker hosts as JSON over HTTP.
//!
//! # Architecture
//!
//! ```text
//! Scheduler process
//!   └── cluster_router (axum)
//!       ├── POST /cluster/v1/offers → Scheduler::resource_offer, returns admitted tasks
//!       └── POST /cluster/v1/status → Scheduler::status_update
//!
//! Worker host
//!   └── NodeAgent
//!       ├── Offers spare capacity every interval
//!       ├── Launches returned tasks on the MigrationExecutor
//!       └── HttpStatusReporter posts RUNNING / FINISHED / FAILED
//! ```

pub mod agent;
pub mod server;
pub mod wire;

pub use agent::{HttpStatusReporter, NodeAgent, NodeAgentConfig};
pub use server::{ClusterState, cluster_router};
pub use wire::{OfferRequest, OfferResponse};

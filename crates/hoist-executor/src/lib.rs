//! hoist-executor — per-host execution of dispatched operations.
//!
//! Runs on every worker host next to the node agent. For each dispatched
//! task the executor performs the container lifecycle step and reports
//! `RUNNING` followed by `FINISHED` or `FAILED`.
//!
//! # Architecture
//!
//! ```text
//! MigrationExecutor
//!   ├── ContainerRuntime  (DockerCli: run, create, inspect, checkpoint, restore, logs, stop, rm)
//!   ├── Archiver          (TarArchiver: tar czf / tar xzf)
//!   ├── ExchangeClient    (HttpExchange: upload_container / download_container)
//!   ├── ProgressObserver  (LogObserver | HttpObserver, self-test notes only)
//!   └── StatusReporter    (cluster transport or in-process channel)
//! ```

pub mod archive;
pub mod command;
pub mod docker;
pub mod error;
pub mod exchange;
pub mod http_client;
pub mod observer;
pub mod reporter;
pub mod scratch;
pub mod workflow;

pub use archive::{Archiver, TarArchiver};
pub use docker::{ContainerRuntime, DockerCli};
pub use error::{ExecResult, ExecutionError};
pub use exchange::{ExchangeClient, HttpExchange};
pub use observer::{HttpObserver, LogObserver, ProgressObserver};
pub use reporter::StatusReporter;
pub use workflow::{ExecutorSettings, MigrationExecutor};

//! hoist-scheduler — offer matching and placement bookkeeping.
//!
//! Turns queued operations into dispatched tasks. The scheduler:
//!
//! - Queues operations from the admin surface, in label form
//! - Matches each resource offer against the queue under the affinity rules
//! - Applies executor status updates to the placement tracker
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   └── Mutex<SchedulerState>
//!       ├── PendingQueue      (operations waiting for an offer)
//!       ├── PlacementTracker  (container → host)
//!       └── logs / stats
//!
//! resource_offers ──► admission::match_offer ──► Dispatch per offer
//! status_update   ──► tracker set / clear on FINISHED
//! ```

pub mod admission;
pub mod error;
pub mod scheduler;

pub use admission::{Admission, DiscardedTask, Dispatch, RequeueReason};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{Scheduler, SchedulerStats};

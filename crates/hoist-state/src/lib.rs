//! hoist-state — in-memory scheduler state for Hoist.
//!
//! Three structures, all owned by the scheduler and never persisted:
//!
//! - **`PlacementTracker`** — container name → host currently running it
//! - **`PendingQueue`** — backlog of tasks not yet matched to an offer
//! - **`DispatchTable`** — admitted tasks not yet confirmed by their agent
//!
//! None of them synchronizes internally. The scheduler keeps all three
//! behind a single lock so that admission always sees a consistent view.

pub mod dispatched;
pub mod queue;
pub mod tracker;

pub use dispatched::{DispatchTable, Dispatched};
pub use queue::PendingQueue;
pub use tracker::PlacementTracker;

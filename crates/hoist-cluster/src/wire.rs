//! Transport message bodies.

use serde::{Deserialize, Serialize};

use hoist_core::{Resources, TaskInfo};

pub const OFFERS_PATH: &str = "/cluster/v1/offers";
pub const STATUS_PATH: &str = "/cluster/v1/status";

/// A host advertising spare capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRequest {
    pub host: String,
    pub cpus: f64,
    pub mem: f64,
}

impl OfferRequest {
    pub fn new(host: impl Into<String>, spare: Resources) -> Self {
        Self {
            host: host.into(),
            cpus: spare.cpus,
            mem: spare.mem,
        }
    }

    pub fn resources(&self) -> Resources {
        Resources::new(self.cpus, self.mem)
    }

    /// Finite and non-negative amounts.
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty()
            && [self.cpus, self.mem]
                .iter()
                .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Tasks admitted against an offer; the host runs all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferResponse {
    pub offer_id: String,
    pub tasks: Vec<TaskInfo>,
}

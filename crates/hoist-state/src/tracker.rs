//! Placement tracker — where each live container runs right now.
//!
//! A name has at most one entry. No entry means the container is not
//! running anywhere, or that its state only exists in the exchange
//! (between a successful checkpoint and the matching restore).

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use hoist_core::HostName;

#[derive(Debug, Default, Clone)]
pub struct PlacementTracker {
    placements: HashMap<String, HostName>,
}

impl PlacementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host currently running `name`.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.placements.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.placements.contains_key(name)
    }

    /// Record `name` as running on `host`. Returns the previous host.
    pub fn set(&mut self, name: &str, host: &str) -> Option<HostName> {
        let previous = self.placements.insert(name.to_string(), host.to_string());
        debug!(container = %name, %host, ?previous, "placement set");
        previous
    }

    /// Forget `name`. Returns the host it was placed on.
    pub fn clear(&mut self, name: &str) -> Option<HostName> {
        let previous = self.placements.remove(name);
        debug!(container = %name, ?previous, "placement cleared");
        previous
    }

    /// Sorted copy of all placements.
    pub fn snapshot(&self) -> BTreeMap<String, HostName> {
        self.placements
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let tracker = PlacementTracker::new();
        assert!(tracker.is_empty());
        assert_eq!(tracker.lookup("web1"), None);
    }

    #[test]
    fn set_then_lookup() {
        let mut tracker = PlacementTracker::new();
        assert_eq!(tracker.set("web1", "host-a"), None);
        assert_eq!(tracker.lookup("web1"), Some("host-a"));
        assert!(tracker.contains("web1"));
    }

    #[test]
    fn set_moves_rather_than_duplicates() {
        let mut tracker = PlacementTracker::new();
        tracker.set("web1", "host-a");
        assert_eq!(tracker.set("web1", "host-b"), Some("host-a".to_string()));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.lookup("web1"), Some("host-b"));
    }

    #[test]
    fn clear_removes_entry() {
        let mut tracker = PlacementTracker::new();
        tracker.set("web1", "host-a");
        assert_eq!(tracker.clear("web1"), Some("host-a".to_string()));
        assert_eq!(tracker.clear("web1"), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn snapshot_is_sorted() {
        let mut tracker = PlacementTracker::new();
        tracker.set("db", "host-b");
        tracker.set("api", "host-a");
        let names: Vec<_> = tracker.snapshot().into_keys().collect();
        assert_eq!(names, vec!["api", "db"]);
    }
}

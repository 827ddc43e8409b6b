//! Task label protocol.
//!
//! Every task carries a flat list of string key/value labels. Both the
//! scheduler (admission) and the executor (workflow selection) decode the
//! operation from these labels, so the key names are part of the wire
//! contract and must not change.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Operation type; one of the `TASK_TYPE` values in [`crate::OperationKind`].
pub const TASK_TYPE: &str = "TASK_TYPE";
/// Container identity.
pub const CONTAINER_NAME: &str = "CONTAINER_NAME";
/// Exchange service base URL.
pub const FILESERVER_IP: &str = "FILESERVER_IP";
/// Host the operation is constrained to.
pub const TARGET_HOST: &str = "TARGET_HOST";
/// Host the operation was matched to; set by the scheduler.
pub const ACCEPTED_HOST: &str = "ACCEPTED_HOST";
/// Optional image override for `RUN_CONTAINER`.
pub const CONTAINER_IMAGE: &str = "CONTAINER_IMAGE";
/// Optional launch command override for `RUN_CONTAINER`.
pub const CONTAINER_COMMAND: &str = "CONTAINER_COMMAND";

/// A single key/value label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// Ordered label set attached to a task or a task status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Labels(Vec<Label>);

impl Labels {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Value of the first label with `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }

    /// Value of `key`, or `MissingLabel` / `EmptyLabel`.
    pub fn require(&self, key: &'static str) -> CoreResult<&str> {
        match self.get(key) {
            None => Err(CoreError::MissingLabel(key)),
            Some("") => Err(CoreError::EmptyLabel { key }),
            Some(v) => Ok(v),
        }
    }

    /// Set `key` to `value`, replacing an existing label with the same key.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|l| l.key == key) {
            Some(label) => label.value = value,
            None => self.0.push(Label {
                key: key.to_string(),
                value,
            }),
        }
    }

    /// Drop `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.0.iter().position(|l| l.key == key)?;
        Some(self.0.remove(pos).value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut labels = Labels::new();
        for (k, v) in iter {
            let key: String = k.into();
            labels.set(&key, v);
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_existing_key() {
        let mut labels = Labels::new();
        labels.set(ACCEPTED_HOST, "host-a");
        labels.set(ACCEPTED_HOST, "host-b");
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get(ACCEPTED_HOST), Some("host-b"));
    }

    #[test]
    fn remove_drops_only_that_key() {
        let mut labels: Labels = [(CONTAINER_NAME, "web1"), (ACCEPTED_HOST, "host-a")]
            .into_iter()
            .collect();
        assert_eq!(labels.remove(ACCEPTED_HOST).as_deref(), Some("host-a"));
        assert_eq!(labels.remove(ACCEPTED_HOST), None);
        assert_eq!(labels.get(CONTAINER_NAME), Some("web1"));
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn require_distinguishes_missing_and_empty() {
        let labels: Labels = [(CONTAINER_NAME, "")].into_iter().collect();
        assert!(matches!(
            labels.require(CONTAINER_NAME),
            Err(CoreError::EmptyLabel { key: CONTAINER_NAME })
        ));
        assert!(matches!(
            labels.require(TARGET_HOST),
            Err(CoreError::MissingLabel(TARGET_HOST))
        ));
    }

    #[test]
    fn serializes_as_key_value_list() {
        let labels: Labels = [(TASK_TYPE, "GET_LOGS")].into_iter().collect();
        let json = serde_json::to_string(&labels).unwrap();
        assert_eq!(json, r#"[{"key":"TASK_TYPE","value":"GET_LOGS"}]"#);
    }
}

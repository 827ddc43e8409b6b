//! Transfer envelope exchanged between hosts during a migration.
//!
//! The JSON shape is fixed by the exchange service:
//!
//! ```json
//! {"Data": "<base64 archive>", "Container": {"Name": "...", "Image": "...", "Command": "..."}}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Descriptor of a container; everything needed to recreate its shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Command")]
    pub command: String,
}

impl ContainerSpec {
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: command.into(),
        }
    }
}

/// Container descriptor plus the checkpoint archive bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEnvelope {
    #[serde(rename = "Data", with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(rename = "Container")]
    pub container: ContainerSpec,
}

impl TransferEnvelope {
    pub fn new(container: ContainerSpec, data: Vec<u8>) -> Self {
        Self { data, container }
    }

    /// Serialize to the exchange's JSON body.
    pub fn to_json(&self) -> CoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CoreError::Envelope(e.to_string()))
    }

    /// Parse an exchange JSON body.
    pub fn from_json(body: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(body).map_err(|e| CoreError::Envelope(e.to_string()))
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

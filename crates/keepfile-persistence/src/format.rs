//! Payload encodings.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PersistenceError, Result};

/// Turns values into file payloads and back.
///
/// A payload that fails to decode is treated as corruption by the
/// rollback reader.
pub trait Format: Send + Sync + 'static {
    /// Encodes a value into the bytes stored on disk.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decodes stored bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON encoding via `serde_json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonFormat {
    pretty: bool,
}

impl JsonFormat {
    /// Indented, human-editable output.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Single-line output.
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonFormat {
    fn default() -> Self {
        Self::pretty()
    }
}

impl Format for JsonFormat {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|e| PersistenceError::EncodeError(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| PersistenceError::DecodeError(e.to_string()))
    }
}

//! The wire-form message exchanged with channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as seen at the transport boundary.
///
/// The payload is always a string here; JSON payloads are serialized and
/// deserialized by the engine as needed. `received_at` is stamped by a
/// channel when the message enters its inbound queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Msg {
    pub topic: String,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl Msg {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: None,
        }
    }

    /// Returns the message with `received_at` set to now.
    pub fn stamped(mut self) -> Self {
        self.received_at = Some(Utc::now());
        self
    }
}

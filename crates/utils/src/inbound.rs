//! Queue envelope types.
//!
//! Records travel between stages inside an [`InboundMessage`], the JSON
//! envelope used by push-style subscriptions: a base64 `data` payload plus
//! opaque delivery metadata. Queues carry the full [`PushEnvelope`] document.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{decode_base64, encode_base64, CodecResult};

/// A single delivered message with its base64-encoded payload.
///
/// Only `data` is consumed by the dispatcher; the remaining fields are
/// carried for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Base64-encoded binary record.
    pub data: String,

    /// Transport-assigned message identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// RFC 3339 publish timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,

    /// Free-form string attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,

    /// Messages sharing an ordering key are delivered in publish order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering_key: Option<String>,
}

impl InboundMessage {
    /// Creates a new [`InboundMessage`] wrapping `payload` with no metadata.
    pub fn from_payload(payload: &[u8]) -> Self {
        Self {
            data: encode_base64(payload),
            ..Default::default()
        }
    }

    /// Decodes the base64 `data` field into raw bytes.
    pub fn payload(&self) -> CodecResult<Vec<u8>> {
        decode_base64(&self.data)
    }

    /// Returns the message id or `"-"` when the transport did not set one.
    pub fn id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("-")
    }
}

/// Push delivery body: a message plus the subscription it was delivered on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: InboundMessage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

impl PushEnvelope {
    /// Parses a push envelope from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes the envelope to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

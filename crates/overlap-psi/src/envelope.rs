//! Wire format for messages crossing the engine boundary.
//!
//! Every message is a JSON object `{ "id", "type", "payload" }`. Responses echo
//! the request's `id` and `type`; an engine failure is reported in `error`.
//! The `Ready` message is unsolicited and carries no meaningful id.

use serde::{Deserialize, Serialize};

/// Opaque encoded byte string (base64 by convention).
///
/// Keys and protocol messages are stored, forwarded and replayed verbatim;
/// nothing on this side of the boundary looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoded(String);

impl Encoded {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Encoded {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeKind {
    CreateRequest,
    CreateResponse,
    ComputeIntersection,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn new(id: impl Into<String>, kind: EnvelopeKind, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
            error: None,
        }
    }

    pub fn ready() -> Self {
        Self::new("", EnvelopeKind::Ready, serde_json::Value::Null)
    }

    /// A response reporting an engine failure for the call `id`.
    pub fn failure(id: impl Into<String>, kind: EnvelopeKind, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(id, kind, serde_json::Value::Null)
        }
    }
}

// ── Payloads ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequestPayload {
    pub grid: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestReply {
    pub context_id: String,
    pub private_key: Encoded,
    pub client_request: Encoded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResponsePayload {
    pub request: Encoded,
    pub grid: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponseReply {
    pub server_setup: Encoded,
    pub server_response: Encoded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeIntersectionPayload {
    pub key: Encoded,
    pub response: Encoded,
    pub setup: Encoded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeIntersectionReply {
    pub intersection: Vec<usize>,
}

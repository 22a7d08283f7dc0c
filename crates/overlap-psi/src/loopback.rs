//! In-process stand-in for the engine boundary.
//!
//! Speaks the same envelope protocol as a real engine (Ready handshake,
//! correlated replies, error replies, base64 payloads) but performs no
//! cryptography: the "request" and "setup" are just encoded token lists and the
//! intersection is a plain set lookup. Good for tests and local simulation,
//! never for real exchanges.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::channel::CorrelationChannel;
use crate::envelope::{
    ComputeIntersectionPayload, ComputeIntersectionReply, CreateRequestPayload,
    CreateRequestReply, CreateResponsePayload, CreateResponseReply, Encoded, Envelope,
    EnvelopeKind,
};

#[derive(Serialize, Deserialize)]
struct TokenList {
    grid: Vec<String>,
}

/// Spawn a loopback engine and return the channel connected to it.
///
/// The engine posts `Ready` as soon as it starts. It stops when the channel is
/// dropped.
pub fn spawn_loopback() -> (Arc<CorrelationChannel>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let channel = Arc::new(CorrelationChannel::new(tx));
    let inbound: Weak<CorrelationChannel> = Arc::downgrade(&channel);

    let handle = tokio::spawn(async move {
        deliver(&inbound, &Envelope::ready());
        while let Some(message) = rx.recv().await {
            let Some(reply) = handle_message(&message) else {
                continue;
            };
            if !deliver(&inbound, &reply) {
                break;
            }
        }
        debug!("loopback engine stopped");
    });

    (channel, handle)
}

fn deliver(inbound: &Weak<CorrelationChannel>, envelope: &Envelope) -> bool {
    let Some(channel) = inbound.upgrade() else {
        return false;
    };
    match serde_json::to_string(envelope) {
        Ok(message) => {
            if let Err(e) = channel.receive(&message) {
                debug!(error = %e, "loopback reply was not accepted");
            }
        }
        Err(e) => debug!(error = %e, "loopback reply failed to serialize"),
    }
    true
}

/// Compute the reply envelope for one request message.
///
/// Returns `None` for a message that does not parse, since there is no id to
/// answer to.
pub fn handle_message(message: &str) -> Option<Envelope> {
    let request: Envelope = match serde_json::from_str(message) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, "loopback dropping unparseable request");
            return None;
        }
    };
    let (id, kind) = (request.id.clone(), request.kind);
    let outcome = match kind {
        EnvelopeKind::CreateRequest => decode(request.payload).and_then(create_request),
        EnvelopeKind::CreateResponse => decode(request.payload).and_then(create_response),
        EnvelopeKind::ComputeIntersection => {
            decode(request.payload).and_then(compute_intersection)
        }
        EnvelopeKind::Ready => Err("Ready is not a request".to_string()),
    };
    Some(match outcome {
        Ok(payload) => Envelope::new(id, kind, payload),
        Err(error) => Envelope::failure(id, kind, error),
    })
}

fn decode<T: for<'de> Deserialize<'de>>(payload: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(payload).map_err(|e| format!("invalid payload: {e}"))
}

fn encode_tokens(grid: Vec<String>) -> Result<Encoded, String> {
    let json = serde_json::to_vec(&TokenList { grid }).map_err(|e| e.to_string())?;
    Ok(Encoded::new(STANDARD.encode(json)))
}

fn decode_tokens(encoded: &Encoded) -> Result<Vec<String>, String> {
    let bytes = STANDARD
        .decode(encoded.as_str())
        .map_err(|e| format!("invalid base64: {e}"))?;
    let list: TokenList =
        serde_json::from_slice(&bytes).map_err(|e| format!("invalid token list: {e}"))?;
    Ok(list.grid)
}

fn to_value<T: Serialize>(reply: T) -> Result<serde_json::Value, String> {
    serde_json::to_value(reply).map_err(|e| e.to_string())
}

fn create_request(payload: CreateRequestPayload) -> Result<serde_json::Value, String> {
    to_value(CreateRequestReply {
        context_id: Uuid::new_v4().to_string(),
        private_key: Encoded::new(STANDARD.encode(Uuid::new_v4().as_bytes())),
        client_request: encode_tokens(payload.grid)?,
    })
}

fn create_response(payload: CreateResponsePayload) -> Result<serde_json::Value, String> {
    let client_tokens = decode_tokens(&payload.request)?;
    to_value(CreateResponseReply {
        server_setup: encode_tokens(payload.grid)?,
        server_response: encode_tokens(client_tokens)?,
    })
}

fn compute_intersection(payload: ComputeIntersectionPayload) -> Result<serde_json::Value, String> {
    STANDARD
        .decode(payload.key.as_str())
        .map_err(|e| format!("invalid key: {e}"))?;
    let client_tokens = decode_tokens(&payload.response)?;
    let server_tokens: HashSet<String> = decode_tokens(&payload.setup)?.into_iter().collect();
    let intersection = client_tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| server_tokens.contains(*token))
        .map(|(index, _)| index)
        .collect();
    to_value(ComputeIntersectionReply { intersection })
}

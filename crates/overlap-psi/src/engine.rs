//! The PSI engine capability and its channel-backed implementation.
//!
//! The engine exposes exactly three operations. Session code only ever sees a
//! [`PsiEngine`] handle, so tests can substitute an engine without touching the
//! protocol flow.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::channel::CorrelationChannel;
use crate::envelope::{
    ComputeIntersectionPayload, ComputeIntersectionReply, CreateRequestPayload,
    CreateRequestReply, CreateResponsePayload, CreateResponseReply, Encoded, EnvelopeKind,
};
use crate::error::{PsiError, Result};

/// A typed engine command: payload type, wire kind, and reply type together.
pub trait EngineCommand: Serialize {
    type Reply: DeserializeOwned;
    fn kind() -> EnvelopeKind;
}

impl EngineCommand for CreateRequestPayload {
    type Reply = CreateRequestReply;
    fn kind() -> EnvelopeKind {
        EnvelopeKind::CreateRequest
    }
}

impl EngineCommand for CreateResponsePayload {
    type Reply = CreateResponseReply;
    fn kind() -> EnvelopeKind {
        EnvelopeKind::CreateResponse
    }
}

impl EngineCommand for ComputeIntersectionPayload {
    type Reply = ComputeIntersectionReply;
    fn kind() -> EnvelopeKind {
        EnvelopeKind::ComputeIntersection
    }
}

#[async_trait]
pub trait PsiEngine: Send + Sync {
    /// Client role: build the request message and private key for a grid.
    async fn create_request(&self, grid: Vec<String>) -> Result<CreateRequestReply>;

    /// Server role: answer a client request with this party's grid.
    async fn create_response(
        &self,
        request: &Encoded,
        grid: Vec<String>,
    ) -> Result<CreateResponseReply>;

    /// Client role: intersect using the stored key and the server's reply.
    async fn compute_intersection(
        &self,
        key: &Encoded,
        response: &Encoded,
        setup: &Encoded,
    ) -> Result<Vec<usize>>;
}

/// [`PsiEngine`] reached through a [`CorrelationChannel`], every call bounded
/// by a deadline.
#[derive(Clone)]
pub struct ChannelEngine {
    channel: Arc<CorrelationChannel>,
    deadline: Duration,
}

impl ChannelEngine {
    pub fn new(channel: Arc<CorrelationChannel>, deadline: Duration) -> Self {
        Self { channel, deadline }
    }

    pub fn channel(&self) -> &Arc<CorrelationChannel> {
        &self.channel
    }

    /// Call a typed command and decode its reply payload.
    pub async fn call<C: EngineCommand>(&self, command: C) -> Result<C::Reply> {
        let payload = serde_json::to_value(&command)?;
        let response = self
            .channel
            .call_with_deadline(C::kind(), payload, self.deadline)
            .await?;
        serde_json::from_value(response.payload).map_err(|e| {
            PsiError::MalformedEnvelope(format!("bad {:?} reply payload: {e}", C::kind()))
        })
    }
}

#[async_trait]
impl PsiEngine for ChannelEngine {
    async fn create_request(&self, grid: Vec<String>) -> Result<CreateRequestReply> {
        self.call(CreateRequestPayload { grid }).await
    }

    async fn create_response(
        &self,
        request: &Encoded,
        grid: Vec<String>,
    ) -> Result<CreateResponseReply> {
        self.call(CreateResponsePayload {
            request: request.clone(),
            grid,
        })
        .await
    }

    async fn compute_intersection(
        &self,
        key: &Encoded,
        response: &Encoded,
        setup: &Encoded,
    ) -> Result<Vec<usize>> {
        let reply = self
            .call(ComputeIntersectionPayload {
                key: key.clone(),
                response: response.clone(),
                setup: setup.clone(),
            })
            .await?;
        Ok(reply.intersection)
    }
}

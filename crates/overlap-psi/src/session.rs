//! Client and server PSI session state machines.
//!
//! Client: `Idle → RequestCreated → RequestSent → AwaitingResponse →
//! IntersectionComputed → Done`. The context (id + private key) is persisted the
//! moment the request is created, so the response can be processed by a later
//! process via [`ClientSession::resume`].
//!
//! Server: `Idle → RequestReceived → ResponseCreated → ResponseSent → Done`.
//! The server never stores key material.
//!
//! Phases reached through the external transport (`RequestSent`,
//! `AwaitingResponse`, `ResponseSent`) are advanced by the caller. A failed
//! engine call leaves the phase unchanged.

use std::fmt;
use std::sync::Arc;

use overlap_grid::Grid;
use tracing::{debug, info};

use crate::context::ContextStore;
use crate::engine::PsiEngine;
use crate::envelope::Encoded;
use crate::error::{PsiError, Result};
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientPhase {
    #[default]
    Idle,
    RequestCreated,
    RequestSent,
    AwaitingResponse,
    IntersectionComputed,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerPhase {
    #[default]
    Idle,
    RequestReceived,
    ResponseCreated,
    ResponseSent,
    Done,
}

impl fmt::Display for ClientPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn advance<P: Copy + PartialEq + fmt::Display>(phase: &mut P, from: P, to: P) -> Result<()> {
    if *phase != from {
        return Err(PsiError::InvalidTransition {
            from: phase.to_string(),
            to: to.to_string(),
        });
    }
    *phase = to;
    Ok(())
}

/// Slot indices shared by both parties, ascending and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Intersection(Vec<usize>);

impl Intersection {
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientSession {
    phase: ClientPhase,
    context_id: Option<String>,
    request: Option<Encoded>,
    intersection: Option<Intersection>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick up a session whose request went out in an earlier process lifetime.
    pub fn resume(context_id: impl Into<String>) -> Self {
        Self {
            phase: ClientPhase::AwaitingResponse,
            context_id: Some(context_id.into()),
            ..Self::default()
        }
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    /// The serialized request to hand to the transport.
    pub fn request(&self) -> Option<&Encoded> {
        self.request.as_ref()
    }

    pub fn intersection(&self) -> Option<&Intersection> {
        self.intersection.as_ref()
    }

    pub fn mark_sent(&mut self) -> Result<()> {
        advance(
            &mut self.phase,
            ClientPhase::RequestCreated,
            ClientPhase::RequestSent,
        )
    }

    pub fn mark_awaiting(&mut self) -> Result<()> {
        advance(
            &mut self.phase,
            ClientPhase::RequestSent,
            ClientPhase::AwaitingResponse,
        )
    }

    pub fn finish(&mut self) -> Result<()> {
        advance(
            &mut self.phase,
            ClientPhase::IntersectionComputed,
            ClientPhase::Done,
        )
    }
}

/// What the client hands to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub context_id: String,
    pub request: Encoded,
}

/// What the server hands back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReply {
    pub response: Encoded,
    pub setup: Encoded,
}

#[derive(Debug, Clone, Default)]
pub struct ServerSession {
    phase: ServerPhase,
    request: Option<Encoded>,
    reply: Option<ServerReply>,
}

impl ServerSession {
    /// A session for a client request that just arrived.
    pub fn received(request: Encoded) -> Self {
        Self {
            phase: ServerPhase::RequestReceived,
            request: Some(request),
            reply: None,
        }
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    pub fn reply(&self) -> Option<&ServerReply> {
        self.reply.as_ref()
    }

    pub fn mark_sent(&mut self) -> Result<()> {
        advance(
            &mut self.phase,
            ServerPhase::ResponseCreated,
            ServerPhase::ResponseSent,
        )
    }

    pub fn finish(&mut self) -> Result<()> {
        advance(&mut self.phase, ServerPhase::ResponseSent, ServerPhase::Done)
    }
}

/// Drives both roles against an engine handle and the shared context store.
pub struct SessionManager<S> {
    engine: Arc<dyn PsiEngine>,
    contexts: ContextStore<S>,
}

impl<S: KeyValueStore> SessionManager<S> {
    pub fn new(engine: Arc<dyn PsiEngine>, contexts: ContextStore<S>) -> Self {
        Self { engine, contexts }
    }

    pub fn contexts(&self) -> &ContextStore<S> {
        &self.contexts
    }

    /// Client role: turn a grid into a request, persisting the new context.
    ///
    /// The grid is consumed; a fresh one is built for every session.
    pub async fn create_request(
        &self,
        session: &mut ClientSession,
        grid: Grid,
    ) -> Result<ClientRequest> {
        if session.phase != ClientPhase::Idle {
            return Err(PsiError::InvalidTransition {
                from: session.phase.to_string(),
                to: ClientPhase::RequestCreated.to_string(),
            });
        }

        let reply = self.engine.create_request(grid.into_tokens()).await?;
        self.contexts
            .put(&reply.context_id, reply.private_key)
            .await?;

        info!(context_id = %reply.context_id, "client request created");
        session.context_id = Some(reply.context_id.clone());
        session.request = Some(reply.client_request.clone());
        session.phase = ClientPhase::RequestCreated;
        Ok(ClientRequest {
            context_id: reply.context_id,
            request: reply.client_request,
        })
    }

    /// Server role: answer the received request with this party's grid.
    pub async fn create_response(
        &self,
        session: &mut ServerSession,
        grid: Grid,
    ) -> Result<ServerReply> {
        let request = match (&session.phase, &session.request) {
            (ServerPhase::RequestReceived, Some(request)) => request,
            _ => {
                return Err(PsiError::InvalidTransition {
                    from: session.phase.to_string(),
                    to: ServerPhase::ResponseCreated.to_string(),
                })
            }
        };

        let reply = self
            .engine
            .create_response(request, grid.into_tokens())
            .await?;
        let reply = ServerReply {
            response: reply.server_response,
            setup: reply.server_setup,
        };

        debug!("server response created");
        session.reply = Some(reply.clone());
        session.phase = ServerPhase::ResponseCreated;
        Ok(reply)
    }

    /// Client role: compute the intersection from the server's reply.
    ///
    /// # Errors
    /// `MissingSession` when the context id is not in the store (never stored,
    /// evicted, or deleted). This is distinct from an empty intersection.
    pub async fn compute_intersection(
        &self,
        session: &mut ClientSession,
        response: &Encoded,
        setup: &Encoded,
    ) -> Result<Intersection> {
        let context_id = match (&session.phase, &session.context_id) {
            (ClientPhase::AwaitingResponse, Some(id)) => id.clone(),
            _ => {
                return Err(PsiError::InvalidTransition {
                    from: session.phase.to_string(),
                    to: ClientPhase::IntersectionComputed.to_string(),
                })
            }
        };

        let key = self
            .contexts
            .get(&context_id)
            .await?
            .ok_or_else(|| PsiError::MissingSession(context_id.clone()))?;

        let indices = self
            .engine
            .compute_intersection(&key, response, setup)
            .await?;
        let intersection = Intersection::from_indices(indices);

        info!(%context_id, shared = intersection.len(), "intersection computed");
        session.intersection = Some(intersection.clone());
        session.phase = ClientPhase::IntersectionComputed;
        Ok(intersection)
    }

    /// Drop the stored context when the user deletes or expires the request.
    pub async fn discard(&self, context_id: &str) -> Result<bool> {
        self.contexts.delete(context_id).await
    }
}

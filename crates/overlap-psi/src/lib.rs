//! # overlap-psi
//!
//! Private Set Intersection orchestration for finding common calendar
//! availability without sharing calendars.
//!
//! The PSI engine itself lives behind an isolation boundary and is reached
//! only by message passing. This crate drives the protocol around it:
//!
//! - [`channel`] — correlation-keyed calls over the one-way boundary, with the
//!   engine's one-time `Ready` handshake
//! - [`engine`] — the three-operation [`PsiEngine`] capability and its
//!   channel-backed implementation
//! - [`session`] — client and server session state machines
//! - [`context`] — bounded, durable store of client private keys
//! - [`store`] — key-value primitive (`MemoryStore`, `FileStore`)
//! - [`orchestrator`] — calendar → grid → PSI → transport → schedule
//! - [`loopback`] — non-cryptographic in-process engine for tests and demos
//! - [`config`] — TOML configuration
//! - [`envelope`] — wire types
//! - [`error`] — Error types

pub mod channel;
pub mod config;
pub mod context;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod loopback;
pub mod orchestrator;
pub mod session;
pub mod store;

pub use channel::{ChannelState, CorrelationChannel, Outbound};
pub use config::PsiConfig;
pub use context::{ContextStore, DEFAULT_CONTEXT_CAPACITY};
pub use engine::{ChannelEngine, PsiEngine};
pub use envelope::{Encoded, Envelope, EnvelopeKind};
pub use error::PsiError;
pub use orchestrator::{
    AvailabilityReply, AvailabilityRequest, CalendarSource, ScheduleOrchestrator, Transport,
};
pub use session::{
    ClientPhase, ClientRequest, ClientSession, Intersection, ServerPhase, ServerReply,
    ServerSession, SessionManager,
};
pub use store::{FileStore, KeyValueStore, MemoryStore};

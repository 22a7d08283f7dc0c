//! Correlation-keyed request/response over a one-directional message boundary.
//!
//! The PSI engine runs where it cannot be invoked directly: we can only post a
//! serialized [`Envelope`] out, and the boundary's inbound handler hands us
//! whatever comes back via [`CorrelationChannel::receive`]. Each outbound call
//! carries a random id; the matching response wakes exactly one one-shot waiter.
//!
//! The engine announces its own startup with an unsolicited `Ready` envelope.
//! Calls made before that are rejected with [`PsiError::NotReady`]; callers
//! that want to wait use [`CorrelationChannel::wait_ready`].
//!
//! There is no built-in deadline on [`CorrelationChannel::call`]. Use
//! [`CorrelationChannel::call_with_deadline`] (as [`crate::ChannelEngine`] does)
//! so an unanswered call does not stall its caller forever; the abandoned
//! waiter is purged when the call future is dropped.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::{PsiError, Result};

/// Outbound half of the boundary.
pub trait Outbound: Send + Sync {
    fn post(&self, message: String) -> Result<()>;
}

impl Outbound for mpsc::UnboundedSender<String> {
    fn post(&self, message: String) -> Result<()> {
        self.send(message).map_err(|_| PsiError::ChannelClosed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninitialized,
    Ready,
    Closed,
}

type Waiters = HashMap<String, oneshot::Sender<Envelope>>;

pub struct CorrelationChannel {
    outbound: Box<dyn Outbound>,
    waiters: Mutex<Waiters>,
    state: watch::Sender<ChannelState>,
}

impl CorrelationChannel {
    pub fn new(outbound: impl Outbound + 'static) -> Self {
        let (state, _) = watch::channel(ChannelState::Uninitialized);
        Self {
            outbound: Box::new(outbound),
            waiters: Mutex::new(HashMap::new()),
            state,
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ChannelState::Ready
    }

    /// Number of calls still waiting for a response.
    pub fn pending(&self) -> usize {
        self.waiters().len()
    }

    /// Suspend until the engine has announced readiness.
    ///
    /// # Errors
    /// `PsiError::ChannelClosed` if the channel is torn down first.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|s| *s != ChannelState::Uninitialized)
            .await
            .map_err(|_| PsiError::ChannelClosed)?;
        match state {
            ChannelState::Closed => Err(PsiError::ChannelClosed),
            _ => Ok(()),
        }
    }

    /// Serialize and push one envelope across the boundary.
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        let message = serde_json::to_string(envelope)?;
        debug!(id = %envelope.id, kind = ?envelope.kind, "posting envelope");
        self.outbound.post(message)
    }

    /// Send a command under a fresh correlation id and wait for its response.
    ///
    /// # Errors
    /// `NotReady` before the engine's `Ready`, `ChannelClosed` on teardown,
    /// `EngineFault` when the response carries an error.
    pub async fn call(&self, kind: EnvelopeKind, payload: serde_json::Value) -> Result<Envelope> {
        self.call_as(Uuid::new_v4().to_string(), kind, payload).await
    }

    /// [`call`](Self::call) bounded by `deadline`.
    ///
    /// # Errors
    /// `ChannelTimeout` when no response arrives in time; the waiter is purged.
    pub async fn call_with_deadline(
        &self,
        kind: EnvelopeKind,
        payload: serde_json::Value,
        deadline: Duration,
    ) -> Result<Envelope> {
        tokio::time::timeout(deadline, self.call(kind, payload))
            .await
            .map_err(|_| {
                warn!(?kind, ?deadline, "engine call timed out");
                PsiError::ChannelTimeout(deadline)
            })?
    }

    /// [`call`](Self::call) with a caller-chosen correlation id.
    ///
    /// # Errors
    /// `DuplicateCorrelationId` if a call with `id` is still pending.
    pub async fn call_as(
        &self,
        id: String,
        kind: EnvelopeKind,
        payload: serde_json::Value,
    ) -> Result<Envelope> {
        match self.state() {
            ChannelState::Uninitialized => return Err(PsiError::NotReady),
            ChannelState::Closed => return Err(PsiError::ChannelClosed),
            ChannelState::Ready => {}
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.waiters();
            if waiters.contains_key(&id) {
                return Err(PsiError::DuplicateCorrelationId(id));
            }
            waiters.insert(id.clone(), tx);
        }
        let _guard = PendingGuard {
            channel: self,
            id: &id,
        };

        self.send(&Envelope::new(id.as_str(), kind, payload))?;

        let response = rx.await.map_err(|_| PsiError::ChannelClosed)?;
        match response.error {
            Some(error) => Err(PsiError::EngineFault(error)),
            None => Ok(response),
        }
    }

    /// Inbound handler: dispatch one message from the boundary.
    ///
    /// The boundary delivers messages one at a time. A `Ready` message flips the
    /// channel to ready once; repeats are ignored.
    ///
    /// # Errors
    /// `MalformedEnvelope` when the message does not parse or matches no
    /// pending call. The waiter table is left untouched in both cases.
    pub fn receive(&self, message: &str) -> Result<()> {
        let envelope: Envelope = serde_json::from_str(message).map_err(|e| {
            warn!(error = %e, "dropping unparseable envelope");
            PsiError::MalformedEnvelope(e.to_string())
        })?;

        if envelope.kind == EnvelopeKind::Ready {
            self.mark_ready();
            return Ok(());
        }

        let waiter = self.waiters().remove(&envelope.id);
        match waiter {
            Some(tx) => {
                debug!(id = %envelope.id, kind = ?envelope.kind, "dispatching response");
                if tx.send(envelope).is_err() {
                    debug!("caller abandoned the call before its response arrived");
                }
                Ok(())
            }
            None => {
                warn!(id = %envelope.id, kind = ?envelope.kind, "response matches no pending call");
                Err(PsiError::MalformedEnvelope(format!(
                    "unmatched correlation id '{}'",
                    envelope.id
                )))
            }
        }
    }

    /// Tear down: pending calls resolve with `ChannelClosed`, new calls are refused.
    pub fn close(&self) {
        self.state.send_replace(ChannelState::Closed);
        let dropped = std::mem::take(&mut *self.waiters());
        if !dropped.is_empty() {
            info!(pending = dropped.len(), "closing channel with calls in flight");
        }
    }

    fn mark_ready(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ChannelState::Uninitialized {
                *state = ChannelState::Ready;
                true
            } else {
                false
            }
        });
        if changed {
            info!("engine ready");
        } else {
            debug!("ignoring repeated ready signal");
        }
    }

    fn waiters(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a call's waiter when the call finishes or is abandoned.
struct PendingGuard<'a> {
    channel: &'a CorrelationChannel,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.channel.waiters().remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (CorrelationChannel, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CorrelationChannel::new(tx), rx)
    }

    #[tokio::test]
    async fn call_before_ready_is_rejected() {
        let (channel, _rx) = channel();
        let err = channel
            .call(EnvelopeKind::CreateRequest, serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, PsiError::NotReady));
    }

    #[test]
    fn ready_is_idempotent() {
        let (channel, _rx) = channel();
        let ready = serde_json::to_string(&Envelope::ready()).unwrap();
        channel.receive(&ready).unwrap();
        channel.receive(&ready).unwrap();
        assert_eq!(channel.state(), ChannelState::Ready);
    }

    #[test]
    fn ready_after_close_does_not_reopen() {
        let (channel, _rx) = channel();
        channel.close();
        channel
            .receive(&serde_json::to_string(&Envelope::ready()).unwrap())
            .unwrap();
        assert_eq!(channel.state(), ChannelState::Closed);
    }
}

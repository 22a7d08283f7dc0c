//! End-to-end scheduling flow on top of the session manager.
//!
//! Requester: read calendar → grid → client request → transport.
//! Responder: read calendar over the requester's window → grid → server
//! response → transport.
//! Requester again, possibly after a restart: reply → intersection → per-day
//! schedule.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use overlap_grid::{build_grid, map_intersection_to_events, BusyInterval, DaySchedule, GridLayout};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PsiConfig;
use crate::envelope::Encoded;
use crate::error::Result;
use crate::session::{ClientSession, ServerSession, SessionManager};
use crate::store::KeyValueStore;

/// Local calendar read access.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Busy intervals touching the layout's window, in any order.
    async fn busy_intervals(&self, layout: &GridLayout) -> Result<Vec<BusyInterval>>;
}

/// Store-and-forward delivery to the counterparty.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver_request(&self, request: &AvailabilityRequest) -> Result<()>;
    async fn deliver_reply(&self, reply: &AvailabilityReply) -> Result<()>;
}

/// Requester → responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub context_id: String,
    pub window_start: DateTime<Utc>,
    pub request: Encoded,
}

/// Responder → requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReply {
    pub context_id: String,
    pub window_start: DateTime<Utc>,
    pub response: Encoded,
    pub setup: Encoded,
}

pub struct ScheduleOrchestrator<S> {
    sessions: SessionManager<S>,
    calendar: Arc<dyn CalendarSource>,
    transport: Arc<dyn Transport>,
    config: PsiConfig,
    tz: Tz,
}

impl<S: KeyValueStore> ScheduleOrchestrator<S> {
    pub fn new(
        sessions: SessionManager<S>,
        calendar: Arc<dyn CalendarSource>,
        transport: Arc<dyn Transport>,
        config: PsiConfig,
    ) -> Result<Self> {
        config.validate()?;
        let tz = config.tz()?;
        Ok(Self {
            sessions,
            calendar,
            transport,
            config,
            tz,
        })
    }

    pub fn sessions(&self) -> &SessionManager<S> {
        &self.sessions
    }

    /// Local midnight of `now` in the configured timezone.
    pub fn window_start_for(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = now
            .with_timezone(&self.tz)
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| self.tz.from_local_datetime(&naive).earliest());
        match midnight {
            Some(local) => local.with_timezone(&Utc),
            // Midnight falls in a DST gap; start from `now` itself.
            None => now,
        }
    }

    async fn grid_for(&self, window_start: DateTime<Utc>) -> Result<overlap_grid::Grid> {
        let layout = self.config.layout(window_start)?;
        let busy = self.calendar.busy_intervals(&layout).await?;
        Ok(build_grid(&busy, &layout))
    }

    /// Start a request for the window beginning today.
    pub async fn request_availability(&self, now: DateTime<Utc>) -> Result<AvailabilityRequest> {
        let window_start = self.window_start_for(now);
        let grid = self.grid_for(window_start).await?;

        let mut session = ClientSession::new();
        let created = self.sessions.create_request(&mut session, grid).await?;
        let outgoing = AvailabilityRequest {
            context_id: created.context_id,
            window_start,
            request: created.request,
        };

        self.transport.deliver_request(&outgoing).await?;
        session.mark_sent()?;
        session.mark_awaiting()?;
        info!(context_id = %outgoing.context_id, "availability request sent");
        Ok(outgoing)
    }

    /// Answer an incoming request over the requester's window.
    pub async fn respond(&self, incoming: &AvailabilityRequest) -> Result<AvailabilityReply> {
        let grid = self.grid_for(incoming.window_start).await?;

        let mut session = ServerSession::received(incoming.request.clone());
        let reply = self.sessions.create_response(&mut session, grid).await?;
        let outgoing = AvailabilityReply {
            context_id: incoming.context_id.clone(),
            window_start: incoming.window_start,
            response: reply.response,
            setup: reply.setup,
        };

        self.transport.deliver_reply(&outgoing).await?;
        session.mark_sent()?;
        session.finish()?;
        info!(context_id = %outgoing.context_id, "availability reply sent");
        Ok(outgoing)
    }

    /// Turn the counterparty's reply into the shared availability schedule.
    pub async fn complete(&self, reply: &AvailabilityReply) -> Result<Vec<DaySchedule>> {
        let layout = self.config.layout(reply.window_start)?;

        let mut session = ClientSession::resume(reply.context_id.clone());
        let intersection = match self
            .sessions
            .compute_intersection(&mut session, &reply.response, &reply.setup)
            .await
        {
            Ok(intersection) => intersection,
            Err(e) => {
                warn!(context_id = %reply.context_id, error = %e, "intersection failed");
                return Err(e);
            }
        };

        let schedule = map_intersection_to_events(intersection.indices(), &layout, self.tz)?;
        session.finish()?;
        Ok(schedule)
    }

    /// Forget a request the user deleted or that expired.
    pub async fn cancel(&self, context_id: &str) -> Result<bool> {
        self.sessions.discard(context_id).await
    }
}

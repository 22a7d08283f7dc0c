//! End-to-end scheduling between two parties over the loopback engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use overlap_grid::{BusyInterval, DaySchedule, GridLayout};
use overlap_psi::error::Result;
use overlap_psi::loopback::spawn_loopback;
use overlap_psi::{
    AvailabilityReply, AvailabilityRequest, CalendarSource, ChannelEngine, ContextStore,
    CorrelationChannel, Envelope, FileStore, KeyValueStore, MemoryStore, PsiConfig, PsiError,
    ScheduleOrchestrator, SessionManager, Transport,
};
use tokio::sync::mpsc;

// ── Fakes ───────────────────────────────────────────────────────────────────

struct StaticCalendar(Vec<BusyInterval>);

#[async_trait]
impl CalendarSource for StaticCalendar {
    async fn busy_intervals(&self, _layout: &GridLayout) -> Result<Vec<BusyInterval>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct Mailbox {
    requests: Mutex<Vec<AvailabilityRequest>>,
    replies: Mutex<Vec<AvailabilityReply>>,
}

#[async_trait]
impl Transport for Mailbox {
    async fn deliver_request(&self, request: &AvailabilityRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn deliver_reply(&self, reply: &AvailabilityReply) -> Result<()> {
        self.replies.lock().unwrap().push(reply.clone());
        Ok(())
    }
}

struct Unreachable;

#[async_trait]
impl Transport for Unreachable {
    async fn deliver_request(&self, _request: &AvailabilityRequest) -> Result<()> {
        Err(PsiError::Transport("peer unreachable".into()))
    }

    async fn deliver_reply(&self, _reply: &AvailabilityReply) -> Result<()> {
        Err(PsiError::Transport("peer unreachable".into()))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, day, hour, minute, 0).unwrap()
}

fn busy(from: DateTime<Utc>, to: DateTime<Utc>) -> BusyInterval {
    BusyInterval::new(from, to)
}

async fn orchestrator<S: KeyValueStore>(
    store: S,
    calendar: Vec<BusyInterval>,
    transport: Arc<dyn Transport>,
    config: PsiConfig,
) -> ScheduleOrchestrator<S> {
    let (channel, _engine) = spawn_loopback();
    channel.wait_ready().await.unwrap();
    let engine = ChannelEngine::new(channel, config.call_timeout());
    let sessions = SessionManager::new(Arc::new(engine), ContextStore::new(store));
    ScheduleOrchestrator::new(
        sessions,
        Arc::new(StaticCalendar(calendar)),
        transport,
        config,
    )
    .unwrap()
}

fn available_labels(schedule: &[DaySchedule], date: NaiveDate) -> Vec<String> {
    schedule
        .iter()
        .find(|day| day.date == date)
        .map(|day| day.available().map(|event| event.label.clone()).collect())
        .unwrap_or_default()
}

// ── Flow ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_parties_find_common_free_slots() {
    let mailbox = Arc::new(Mailbox::default());
    let alice = orchestrator(
        MemoryStore::new(),
        vec![busy(at(1, 9, 0), at(1, 10, 0))],
        mailbox.clone(),
        PsiConfig::default(),
    )
    .await;
    let bob = orchestrator(
        MemoryStore::new(),
        vec![busy(at(1, 9, 30), at(1, 11, 0))],
        mailbox.clone(),
        PsiConfig::default(),
    )
    .await;

    let request = alice.request_availability(at(1, 8, 30)).await.unwrap();
    assert_eq!(request.window_start, at(1, 0, 0));
    assert_eq!(mailbox.requests.lock().unwrap().len(), 1);

    let reply = bob.respond(&request).await.unwrap();
    assert_eq!(reply.context_id, request.context_id);
    assert_eq!(mailbox.replies.lock().unwrap().len(), 1);

    let schedule = alice.complete(&reply).await.unwrap();
    assert_eq!(schedule.len(), 14);
    assert!(schedule.iter().all(|day| day.events.len() == 96));

    let first_day = available_labels(&schedule, NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());
    assert_eq!(first_day.len(), 96 - 8);
    assert!(first_day.contains(&"08:45".to_string()));
    assert!(!first_day.contains(&"09:00".to_string()));
    assert!(!first_day.contains(&"10:45".to_string()));
    assert!(first_day.contains(&"11:00".to_string()));

    let second_day = available_labels(&schedule, NaiveDate::from_ymd_opt(2021, 3, 2).unwrap());
    assert_eq!(second_day.len(), 96);
}

#[tokio::test]
async fn request_persists_context_for_later_completion() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(Mailbox::default());

    let request = {
        let alice = orchestrator(
            FileStore::new(dir.path()),
            vec![],
            mailbox.clone(),
            PsiConfig::default(),
        )
        .await;
        alice.request_availability(at(1, 12, 0)).await.unwrap()
    };

    let bob = orchestrator(
        MemoryStore::new(),
        vec![busy(at(2, 0, 0), at(3, 0, 0))],
        mailbox.clone(),
        PsiConfig::default(),
    )
    .await;
    let reply = bob.respond(&request).await.unwrap();

    // A fresh requester over the same directory, as after a restart.
    let alice_again = orchestrator(
        FileStore::new(dir.path()),
        vec![],
        mailbox.clone(),
        PsiConfig::default(),
    )
    .await;
    let schedule = alice_again.complete(&reply).await.unwrap();

    let blocked_day = available_labels(&schedule, NaiveDate::from_ymd_opt(2021, 3, 2).unwrap());
    assert!(blocked_day.is_empty());
    let free_day = available_labels(&schedule, NaiveDate::from_ymd_opt(2021, 3, 3).unwrap());
    assert_eq!(free_day.len(), 96);
}

#[tokio::test]
async fn cancelled_request_cannot_be_completed() {
    let mailbox = Arc::new(Mailbox::default());
    let alice = orchestrator(MemoryStore::new(), vec![], mailbox.clone(), PsiConfig::default()).await;
    let bob = orchestrator(MemoryStore::new(), vec![], mailbox.clone(), PsiConfig::default()).await;

    let request = alice.request_availability(at(1, 8, 0)).await.unwrap();
    let reply = bob.respond(&request).await.unwrap();
    assert!(alice.cancel(&request.context_id).await.unwrap());

    let err = alice.complete(&reply).await.unwrap_err();
    assert!(matches!(err, PsiError::MissingSession(id) if id == request.context_id));
}

#[tokio::test]
async fn window_starts_at_local_midnight() {
    let config = PsiConfig {
        timezone: "Europe/Berlin".into(),
        ..PsiConfig::default()
    };
    let mailbox = Arc::new(Mailbox::default());
    let alice = orchestrator(MemoryStore::new(), vec![], mailbox.clone(), config).await;

    // 00:30 Berlin on March 2nd is still March 1st in UTC.
    let start = alice.window_start_for(at(1, 23, 30));
    assert_eq!(start, at(1, 23, 0));

    let request = alice.request_availability(at(1, 23, 30)).await.unwrap();
    assert_eq!(request.window_start, at(1, 23, 0));
}

// ── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transport_failure_is_reported() {
    let alice = orchestrator(
        MemoryStore::new(),
        vec![],
        Arc::new(Unreachable),
        PsiConfig::default(),
    )
    .await;
    let err = alice.request_availability(at(1, 8, 0)).await.unwrap_err();
    assert!(matches!(err, PsiError::Transport(_)));
}

#[tokio::test]
async fn silent_engine_surfaces_channel_timeout() {
    let (tx, _rx) = mpsc::unbounded_channel::<String>();
    let channel = Arc::new(CorrelationChannel::new(tx));
    channel
        .receive(&serde_json::to_string(&Envelope::ready()).unwrap())
        .unwrap();
    let engine = ChannelEngine::new(Arc::clone(&channel), Duration::from_millis(30));
    let sessions = SessionManager::new(Arc::new(engine), ContextStore::new(MemoryStore::new()));
    let alice = ScheduleOrchestrator::new(
        sessions,
        Arc::new(StaticCalendar(vec![])),
        Arc::new(Mailbox::default()),
        PsiConfig::default(),
    )
    .unwrap();

    let err = alice.request_availability(at(1, 8, 0)).await.unwrap_err();
    assert!(matches!(err, PsiError::ChannelTimeout(_)));
    assert_eq!(channel.pending(), 0);
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let config = PsiConfig {
        slice_minutes: 7,
        ..PsiConfig::default()
    };
    let sessions = SessionManager::new(
        Arc::new(ChannelEngine::new(spawn_loopback().0, Duration::from_secs(1))),
        ContextStore::new(MemoryStore::new()),
    );
    let result = ScheduleOrchestrator::new(
        sessions,
        Arc::new(StaticCalendar(vec![])),
        Arc::new(Mailbox::default()),
        config,
    );
    assert!(result.is_err());
}

//! `overlap` CLI: build availability grids, rebuild schedules from PSI
//! results, and simulate a full exchange between two calendars.
//!
//! ## Usage
//!
//! ```sh
//! # Calendar JSON → slot tokens for the PSI engine
//! overlap grid -i alice.json --start 2021-03-01T00:00:00Z
//!
//! # Intersection indices → per-day schedule
//! echo '[36, 37, 38]' | overlap slots --start 2021-03-01T00:00:00Z --tz Europe/Berlin
//!
//! # Both sides of the protocol over the in-process loopback engine
//! overlap simulate --requester alice.json --responder bob.json --available-only
//!
//! # Defaults from a TOML file; flags win
//! overlap --config overlap.toml simulate --requester a.json --responder b.json
//! ```

mod calendar;

use std::collections::VecDeque;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use overlap_grid::{build_grid, map_intersection_to_events, DaySchedule};
use overlap_psi::loopback::spawn_loopback;
use overlap_psi::{
    AvailabilityReply, AvailabilityRequest, ChannelEngine, ContextStore, MemoryStore, PsiConfig,
    ScheduleOrchestrator, SessionManager, Transport,
};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::calendar::CalendarFile;

#[derive(Parser)]
#[command(
    name = "overlap",
    version,
    about = "Find common calendar availability without sharing calendars"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Scheduler configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn a calendar into the slot tokens handed to the PSI engine
    Grid {
        /// Calendar JSON (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// First instant of the window (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Turn intersection indices back into a per-day schedule
    Slots {
        /// JSON array of slot indices (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// First instant of the window the indices refer to (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,
        #[command(flatten)]
        window: WindowArgs,
        /// Only list available slots
        #[arg(long)]
        available_only: bool,
    },
    /// Run both roles of an exchange over the loopback engine
    Simulate {
        /// Calendar JSON of the party asking for availability
        #[arg(long)]
        requester: String,
        /// Calendar JSON of the party answering
        #[arg(long)]
        responder: String,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// Reference instant; the window starts at its local midnight
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        #[command(flatten)]
        window: WindowArgs,
        /// Only list available slots
        #[arg(long)]
        available_only: bool,
    },
}

/// Grid shape overrides on top of the configuration file.
#[derive(Args)]
struct WindowArgs {
    /// Window length in days
    #[arg(long)]
    days: Option<u32>,
    /// Slot length in minutes; must divide a day evenly
    #[arg(long)]
    slice: Option<u32>,
    /// IANA timezone for day boundaries and labels
    #[arg(long)]
    tz: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GridOutput {
    window_start: DateTime<Utc>,
    slice_minutes: u32,
    slot_count: usize,
    busy_slots: usize,
    tokens: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    match cli.command {
        Commands::Grid {
            input,
            output,
            start,
            window,
        } => {
            let config = effective_config(cli.config.as_deref(), &window)?;
            let calendar = CalendarFile::parse(&read_input(input.as_deref())?)?;
            let layout = config.layout(start)?;
            let busy = calendar
                .busy_in(&layout)
                .context("Failed to expand recurring events")?;

            let grid = build_grid(&busy, &layout);
            let busy_slots = grid.slots().iter().filter(|slot| !slot.available).count();
            info!(slots = grid.len(), busy_slots, "grid built");

            let out = GridOutput {
                window_start: start,
                slice_minutes: config.slice_minutes,
                slot_count: grid.len(),
                busy_slots,
                tokens: grid.into_tokens(),
            };
            write_json(output.as_deref(), &out)?;
        }
        Commands::Slots {
            input,
            output,
            start,
            window,
            available_only,
        } => {
            let config = effective_config(cli.config.as_deref(), &window)?;
            let raw = read_input(input.as_deref())?;
            let indices: Vec<usize> =
                serde_json::from_str(&raw).context("Failed to parse intersection JSON")?;

            let layout = config.layout(start)?;
            let schedule = map_intersection_to_events(&indices, &layout, config.tz()?)
                .context("Failed to map intersection to slots")?;
            write_json(output.as_deref(), &filtered(schedule, available_only))?;
        }
        Commands::Simulate {
            requester,
            responder,
            output,
            now,
            window,
            available_only,
        } => {
            let config = effective_config(cli.config.as_deref(), &window)?;
            let requester = CalendarFile::parse(&read_input(Some(requester.as_str()))?)?;
            let responder = CalendarFile::parse(&read_input(Some(responder.as_str()))?)?;

            let schedule = simulate(
                config,
                requester,
                responder,
                now.unwrap_or_else(Utc::now),
            )
            .await?;
            write_json(output.as_deref(), &filtered(schedule, available_only))?;
        }
    }

    Ok(())
}

/// Load the configuration file if given, then apply flag overrides.
fn effective_config(path: Option<&Path>, window: &WindowArgs) -> Result<PsiConfig> {
    let mut config = match path {
        Some(path) => PsiConfig::load(path)?,
        None => PsiConfig::default(),
    };
    if let Some(days) = window.days {
        config.window_days = days;
    }
    if let Some(slice) = window.slice {
        config.slice_minutes = slice;
    }
    if let Some(tz) = &window.tz {
        config.timezone = tz.clone();
    }
    config.validate().context("Invalid grid settings")?;
    Ok(config)
}

/// One full exchange: request, response, intersection, schedule.
async fn simulate(
    config: PsiConfig,
    requester: CalendarFile,
    responder: CalendarFile,
    now: DateTime<Utc>,
) -> Result<Vec<DaySchedule>> {
    let relay = Arc::new(Relay::default());
    let asking = party(requester, Arc::clone(&relay), config.clone()).await?;
    let answering = party(responder, Arc::clone(&relay), config).await?;

    asking
        .request_availability(now)
        .await
        .context("Requester failed to create a request")?;
    let request = relay.next_request()?;

    answering
        .respond(&request)
        .await
        .context("Responder failed to answer")?;
    let reply = relay.next_reply()?;

    let schedule = asking
        .complete(&reply)
        .await
        .context("Requester failed to compute the intersection")?;
    asking.cancel(&reply.context_id).await?;
    Ok(schedule)
}

async fn party(
    calendar: CalendarFile,
    relay: Arc<Relay>,
    config: PsiConfig,
) -> Result<ScheduleOrchestrator<MemoryStore>> {
    let (channel, _engine) = spawn_loopback();
    channel.wait_ready().await?;

    let engine = ChannelEngine::new(channel, config.call_timeout());
    let contexts = ContextStore::with_capacity(MemoryStore::new(), config.context_capacity);
    let sessions = SessionManager::new(Arc::new(engine), contexts);
    Ok(ScheduleOrchestrator::new(
        sessions,
        Arc::new(calendar),
        relay,
        config,
    )?)
}

/// In-memory transport carrying serialized messages between the two parties.
#[derive(Default)]
struct Relay {
    requests: Mutex<VecDeque<String>>,
    replies: Mutex<VecDeque<String>>,
}

impl Relay {
    fn next_request(&self) -> Result<AvailabilityRequest> {
        let wire = self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .context("No request was relayed")?;
        serde_json::from_str(&wire).context("Relayed request is not valid JSON")
    }

    fn next_reply(&self) -> Result<AvailabilityReply> {
        let wire = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .context("No reply was relayed")?;
        serde_json::from_str(&wire).context("Relayed reply is not valid JSON")
    }
}

#[async_trait]
impl Transport for Relay {
    async fn deliver_request(
        &self,
        request: &AvailabilityRequest,
    ) -> overlap_psi::error::Result<()> {
        let wire = serde_json::to_string(request)?;
        debug!(bytes = wire.len(), "request relayed");
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(wire);
        Ok(())
    }

    async fn deliver_reply(&self, reply: &AvailabilityReply) -> overlap_psi::error::Result<()> {
        let wire = serde_json::to_string(reply)?;
        debug!(bytes = wire.len(), "reply relayed");
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(wire);
        Ok(())
    }
}

fn filtered(mut schedule: Vec<DaySchedule>, available_only: bool) -> Vec<DaySchedule> {
    if available_only {
        for day in &mut schedule {
            day.events.retain(|event| event.available);
        }
    }
    schedule
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_json<T: Serialize>(path: Option<&str>, value: &T) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}

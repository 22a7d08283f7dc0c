//! Calendar intervals → fixed-length sequence of slot tokens.
//!
//! Tokens become PSI set elements, so their format matters: every token is
//! `<slot timestamp>.<16 hex chars>`. Free slots carry a fixed shared filler so
//! both parties produce the same element for the same free slot; busy slots
//! carry fresh random filler so they never match and cannot be told apart from
//! free tokens by length or shape.
//!
//! The shared filler must stay on the free side: it is the only thing that
//! makes a slot free for both parties land in the intersection. Giving busy
//! slots the shared filler would intersect common busy time instead.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::layout::GridLayout;

/// Length of the filler suffix in hex characters.
pub const FILLER_LEN: usize = 16;

/// Filler shared by every free slot.
const SHARED_FILLER: &str = "9e3779b97f4a7c15";

/// A busy calendar interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// One slot of a party's grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlot {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub available: bool,
    pub token: String,
}

/// A party's discretized calendar. Immutable once built.
#[derive(Debug, Clone)]
pub struct Grid {
    layout: GridLayout,
    slots: Vec<TimeSlot>,
}

impl Grid {
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Consume the grid, yielding its tokens in slot order.
    pub fn into_tokens(self) -> Vec<String> {
        self.slots.into_iter().map(|slot| slot.token).collect()
    }
}

/// Timestamp-derived token prefix, identical for busy and free tokens of a slot.
pub fn token_prefix(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn free_token(timestamp: DateTime<Utc>) -> String {
    format!("{}.{}", token_prefix(timestamp), SHARED_FILLER)
}

fn busy_token<R: Rng + ?Sized>(timestamp: DateTime<Utc>, rng: &mut R) -> String {
    let filler = loop {
        let candidate = format!("{:0width$x}", rng.gen::<u64>(), width = FILLER_LEN);
        if candidate != SHARED_FILLER {
            break candidate;
        }
    };
    format!("{}.{}", token_prefix(timestamp), filler)
}

/// Build a grid using the thread-local RNG for busy fillers.
pub fn build_grid(events: &[BusyInterval], layout: &GridLayout) -> Grid {
    build_grid_with_rng(events, layout, &mut rand::thread_rng())
}

/// Build a grid with an explicit RNG.
///
/// A slot `[t, t + slice)` is busy when any event overlaps it, which includes
/// every slot whose start `t` satisfies `start <= t < end`. Events may arrive
/// in any order; empty and inverted intervals mark nothing.
pub fn build_grid_with_rng<R: Rng + ?Sized>(
    events: &[BusyInterval],
    layout: &GridLayout,
    rng: &mut R,
) -> Grid {
    let slot_count = layout.slot_count();
    let mut busy = vec![false; slot_count];
    for event in events {
        for flag in &mut busy[layout.overlapping(event.start, event.end)] {
            *flag = true;
        }
    }

    let slots = busy
        .into_iter()
        .enumerate()
        .map(|(index, is_busy)| {
            let timestamp = layout.timestamp(index);
            let token = if is_busy {
                busy_token(timestamp, rng)
            } else {
                free_token(timestamp)
            };
            TimeSlot {
                index,
                timestamp,
                available: !is_busy,
                token,
            }
        })
        .collect();

    Grid {
        layout: *layout,
        slots,
    }
}

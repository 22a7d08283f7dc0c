//! Intersection indices → per-day availability records for display.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{GridError, Result};
use crate::layout::GridLayout;

/// Display-ready reconstruction of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEvent {
    /// Local wall-clock start, `HH:MM`.
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub available: bool,
}

/// All slots of one grid day, in slot order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySchedule {
    /// Local date of the day's first slot.
    pub date: NaiveDate,
    pub events: Vec<ScheduleEvent>,
}

impl DaySchedule {
    pub fn available(&self) -> impl Iterator<Item = &ScheduleEvent> {
        self.events.iter().filter(|e| e.available)
    }
}

/// Rebuild per-day schedules from intersection indices.
///
/// Index `i` belongs to day `i / slices_per_day`, position `i % slices_per_day`.
/// Every slot of the layout is emitted; those listed in `intersection` are
/// marked available.
///
/// # Errors
/// Returns `GridError::IndexOutOfRange` for any index `>= layout.slot_count()`.
pub fn map_intersection_to_events(
    intersection: &[usize],
    layout: &GridLayout,
    tz: Tz,
) -> Result<Vec<DaySchedule>> {
    let slot_count = layout.slot_count();
    if let Some(&index) = intersection.iter().find(|&&i| i >= slot_count) {
        return Err(GridError::IndexOutOfRange { index, slot_count });
    }
    let available: BTreeSet<usize> = intersection.iter().copied().collect();

    let per_day = layout.slices_per_day();
    let days = slot_count.div_ceil(per_day);

    let schedules = (0..days)
        .map(|day| {
            let first = day * per_day;
            let last = (first + per_day).min(slot_count);
            let events = (first..last)
                .map(|index| {
                    let timestamp = layout.timestamp(index);
                    ScheduleEvent {
                        label: timestamp.with_timezone(&tz).format("%H:%M").to_string(),
                        timestamp,
                        available: available.contains(&index),
                    }
                })
                .collect();
            DaySchedule {
                date: layout.timestamp(first).with_timezone(&tz).date_naive(),
                events,
            }
        })
        .collect();

    Ok(schedules)
}

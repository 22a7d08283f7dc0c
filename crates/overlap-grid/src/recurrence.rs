//! Recurring busy blocks → concrete busy intervals inside a grid window.
//!
//! Calendar sources often hold a weekly standup as one RRULE rather than as
//! fourteen separate events. This expands such a rule (RFC 5545, via the
//! `rrule` crate) with DST-correct local times from `chrono-tz`, keeping only
//! the occurrences that touch the layout's window.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;
use serde::Deserialize;

use crate::error::{GridError, Result};
use crate::grid::BusyInterval;
use crate::layout::GridLayout;

/// Upper bound on occurrences expanded for one rule. A rule with more
/// occurrences inside the window is rejected rather than truncated.
const MAX_OCCURRENCES: u16 = u16::MAX;

/// A recurring busy block as read from a calendar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecurringBusy {
    /// RRULE body, e.g. `FREQ=WEEKLY;BYDAY=MO,WE`.
    pub rrule: String,
    /// Local start of the first occurrence, `YYYY-MM-DDTHH:MM:SS`.
    pub dtstart: String,
    pub duration_minutes: u32,
    /// IANA timezone of `dtstart`.
    pub timezone: String,
}

impl RecurringBusy {
    /// Expand into busy intervals that overlap the layout's window.
    ///
    /// # Errors
    /// `GridError::InvalidRule` for an empty or unparseable rule, or one with
    /// more occurrences in the window than can be expanded;
    /// `GridError::InvalidTimezone` for an unknown IANA name.
    pub fn expand(&self, layout: &GridLayout) -> Result<Vec<BusyInterval>> {
        if self.rrule.trim().is_empty() {
            return Err(GridError::InvalidRule("empty RRULE string".to_string()));
        }
        let _tz: chrono_tz::Tz = self
            .timezone
            .parse()
            .map_err(|_| GridError::InvalidTimezone(self.timezone.clone()))?;

        let text = format!(
            "DTSTART;TZID={}:{}\nRRULE:{}",
            self.timezone,
            self.dtstart.replace(['-', ':'], ""),
            self.rrule
        );
        let set: RRuleSet = text
            .parse()
            .map_err(|e| GridError::InvalidRule(format!("{e}")))?;

        let duration = Duration::minutes(i64::from(self.duration_minutes));
        // Occurrences starting up to one duration before the window still reach into it.
        let from = (layout.window_start() - duration).with_timezone(&rrule::Tz::UTC);
        let to = layout.window_end().with_timezone(&rrule::Tz::UTC);

        let occurrences = set.after(from).before(to).all(MAX_OCCURRENCES);
        if occurrences.limited {
            return Err(GridError::InvalidRule(format!(
                "more than {MAX_OCCURRENCES} occurrences in the window"
            )));
        }
        Ok(occurrences
            .dates
            .into_iter()
            .map(|dt| {
                let start: DateTime<Utc> = dt.with_timezone(&Utc);
                BusyInterval::new(start, start + duration)
            })
            .filter(|busy| busy.start < layout.window_end() && busy.end > layout.window_start())
            .collect())
    }
}

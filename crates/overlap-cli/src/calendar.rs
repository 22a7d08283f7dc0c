//! Calendar files read by the CLI.
//!
//! ```json
//! {
//!   "busy": [{ "start": "2021-03-01T09:00:00Z", "end": "2021-03-01T10:00:00Z" }],
//!   "recurring": [{
//!     "rrule": "FREQ=WEEKLY;BYDAY=MO",
//!     "dtstart": "2021-03-01T08:00:00",
//!     "duration_minutes": 30,
//!     "timezone": "Europe/Berlin"
//!   }]
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use overlap_grid::{BusyInterval, GridLayout, RecurringBusy};
use overlap_psi::CalendarSource;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarFile {
    pub busy: Vec<BusyInterval>,
    pub recurring: Vec<RecurringBusy>,
}

impl CalendarFile {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse calendar JSON")
    }

    /// All busy intervals touching the layout's window, recurring ones expanded.
    pub fn busy_in(&self, layout: &GridLayout) -> overlap_grid::error::Result<Vec<BusyInterval>> {
        let mut intervals = self.busy.clone();
        for rule in &self.recurring {
            intervals.extend(rule.expand(layout)?);
        }
        Ok(intervals)
    }
}

#[async_trait]
impl CalendarSource for CalendarFile {
    async fn busy_intervals(
        &self,
        layout: &GridLayout,
    ) -> overlap_psi::error::Result<Vec<BusyInterval>> {
        Ok(self.busy_in(layout)?)
    }
}

//! The fixed partition of a multi-day window into equal time slices.
//!
//! Both parties of a PSI exchange must build their grids from the same layout,
//! otherwise slot indices (and the timestamps baked into tokens) do not line up.

use chrono::{DateTime, Duration, Utc};

use crate::error::{GridError, Result};

/// Default slice duration in minutes.
pub const DEFAULT_SLICE_MINUTES: u32 = 15;

/// Default forward-looking window length in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 14;

const SECONDS_PER_DAY: i64 = 86_400;

/// A half-open window `[window_start, window_end)` cut into slices of equal length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    slice_seconds: i64,
}

impl GridLayout {
    /// Build a layout from explicit bounds.
    ///
    /// # Errors
    /// Returns `GridError::InvalidLayout` when the window is empty, or when the
    /// slice is not positive or does not divide a day evenly (days would not
    /// hold a whole number of slots).
    pub fn new(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        slice: Duration,
    ) -> Result<Self> {
        let slice_seconds = slice.num_seconds();
        if slice_seconds <= 0 || Duration::seconds(slice_seconds) != slice {
            return Err(GridError::InvalidLayout(format!(
                "slice must be a positive whole number of seconds, got {slice}"
            )));
        }
        if SECONDS_PER_DAY % slice_seconds != 0 {
            return Err(GridError::InvalidLayout(format!(
                "slice of {slice_seconds}s does not divide a day evenly"
            )));
        }
        if window_end <= window_start {
            return Err(GridError::InvalidLayout(format!(
                "window end {window_end} is not after window start {window_start}"
            )));
        }
        Ok(Self {
            window_start,
            window_end,
            slice_seconds,
        })
    }

    /// Build a layout covering `days` whole days from `window_start`.
    ///
    /// # Errors
    /// `GridError::InvalidLayout` as for [`new`](Self::new), or when the window
    /// end falls outside the representable date range.
    pub fn days(window_start: DateTime<Utc>, days: u32, slice_minutes: u32) -> Result<Self> {
        let window_end = Duration::try_days(i64::from(days))
            .and_then(|span| window_start.checked_add_signed(span))
            .ok_or_else(|| {
                GridError::InvalidLayout(format!(
                    "a window of {days} days from {window_start} is out of range"
                ))
            })?;
        Self::new(
            window_start,
            window_end,
            Duration::minutes(i64::from(slice_minutes)),
        )
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_end
    }

    pub fn slice(&self) -> Duration {
        Duration::seconds(self.slice_seconds)
    }

    /// Number of slots: `⌈(window_end − window_start) / slice⌉`.
    pub fn slot_count(&self) -> usize {
        let span = (self.window_end - self.window_start).num_milliseconds();
        let slice = self.slice_seconds * 1000;
        ((span + slice - 1) / slice) as usize
    }

    pub fn slices_per_day(&self) -> usize {
        (SECONDS_PER_DAY / self.slice_seconds) as usize
    }

    /// Start timestamp of the slot at `index`.
    pub fn timestamp(&self, index: usize) -> DateTime<Utc> {
        self.window_start + Duration::seconds(self.slice_seconds * index as i64)
    }

    /// Range of slot indices overlapped by `[start, end)`, clipped to the window.
    ///
    /// Empty when the interval is empty, inverted, or outside the window.
    pub(crate) fn overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> std::ops::Range<usize> {
        let start = start.max(self.window_start);
        let end = end.min(self.window_end);
        if start >= end {
            return 0..0;
        }
        let slice = self.slice_seconds * 1000;
        let from = (start - self.window_start).num_milliseconds() / slice;
        let to = ((end - self.window_start).num_milliseconds() + slice - 1) / slice;
        (from as usize)..(to as usize).min(self.slot_count())
    }
}

//! # overlap-grid
//!
//! Discretizes calendars into a shared time grid for private set intersection,
//! and turns intersection results back into per-day availability.
//!
//! Two parties that want to find a common free slot each build a [`Grid`] over
//! the same [`GridLayout`]. The grid tokens are handed to a PSI engine as set
//! elements; the engine returns the indices both parties share, and
//! [`map_intersection_to_events`] rebuilds the display model from them.
//!
//! ## Modules
//!
//! - [`layout`] — window/slice partition and default constants
//! - [`grid`] — busy intervals → slot tokens
//! - [`reconstruct`] — intersection indices → [`DaySchedule`]s
//! - [`recurrence`] — RRULE busy blocks → busy intervals
//! - [`error`] — Error types

pub mod error;
pub mod grid;
pub mod layout;
pub mod reconstruct;
pub mod recurrence;

pub use error::GridError;
pub use grid::{build_grid, build_grid_with_rng, BusyInterval, Grid, TimeSlot};
pub use layout::{GridLayout, DEFAULT_SLICE_MINUTES, DEFAULT_WINDOW_DAYS};
pub use reconstruct::{map_intersection_to_events, DaySchedule, ScheduleEvent};
pub use recurrence::RecurringBusy;

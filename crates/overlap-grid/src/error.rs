//! Error types for grid construction and reconstruction.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// The window or slice duration cannot describe a fixed partition.
    #[error("Invalid grid layout: {0}")]
    InvalidLayout(String),

    /// An intersection index points past the end of the grid.
    #[error("Intersection index {index} out of range for a grid of {slot_count} slots")]
    IndexOutOfRange { index: usize, slot_count: usize },

    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

pub type Result<T> = std::result::Result<T, GridError>;

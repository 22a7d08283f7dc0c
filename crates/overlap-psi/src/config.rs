//! Scheduler configuration, loaded from TOML.
//!
//! ```toml
//! slice_minutes = 15
//! window_days = 14
//! context_capacity = 10
//! timezone = "Europe/Berlin"
//! call_timeout_secs = 30
//! ```
//!
//! Every field is optional and falls back to its default.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use overlap_grid::{GridLayout, DEFAULT_SLICE_MINUTES, DEFAULT_WINDOW_DAYS};
use serde::{Deserialize, Serialize};

use crate::context::DEFAULT_CONTEXT_CAPACITY;
use crate::error::{PsiError, Result};

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Longest window accepted; every grid holds one slot per slice of it.
pub const MAX_WINDOW_DAYS: u32 = 366;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsiConfig {
    pub slice_minutes: u32,
    pub window_days: u32,
    pub context_capacity: usize,
    /// IANA timezone used for day boundaries and slot labels.
    pub timezone: String,
    pub call_timeout_secs: u64,
}

impl Default for PsiConfig {
    fn default() -> Self {
        Self {
            slice_minutes: DEFAULT_SLICE_MINUTES,
            window_days: DEFAULT_WINDOW_DAYS,
            context_capacity: DEFAULT_CONTEXT_CAPACITY,
            timezone: "UTC".to_string(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

impl PsiConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PsiError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| PsiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_days == 0 || self.window_days > MAX_WINDOW_DAYS {
            return Err(PsiError::Config(format!(
                "window_days must be between 1 and {MAX_WINDOW_DAYS}, got {}",
                self.window_days
            )));
        }
        if self.context_capacity == 0 {
            return Err(PsiError::Config("context_capacity must be at least 1".into()));
        }
        if self.call_timeout_secs == 0 {
            return Err(PsiError::Config("call_timeout_secs must be at least 1".into()));
        }
        self.tz()?;
        // Slice validity is the grid's call.
        self.layout(DateTime::<Utc>::UNIX_EPOCH)?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| PsiError::Config(format!("unknown timezone '{}'", self.timezone)))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// The grid layout for a window starting at `window_start`.
    pub fn layout(&self, window_start: DateTime<Utc>) -> Result<GridLayout> {
        Ok(GridLayout::days(window_start, self.window_days, self.slice_minutes)?)
    }
}

//! Per-session settings.

use crate::utils::config::{DEFAULT_ENTRY_POINT, DEFAULT_RUN_TIMEOUT, DEFAULT_SWEEP_GRACE};
use std::time::Duration;

/// Knobs for a [`super::TraceSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Wall-clock budget of each run
    pub timeout: Duration,

    /// Delay between the root's `end` and the orphan sweep
    pub grace: Duration,

    /// Name preferred when choosing the root
    pub entry_point: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RUN_TIMEOUT,
            grace: DEFAULT_SWEEP_GRACE,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }
}

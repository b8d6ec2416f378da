//! Task gate settings.

use serde::{Deserialize, Serialize};

/// Default window after which a started task is presumed finished.
const fn default_stale_after_minutes() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskGateConfig {
    /// Minutes a start stays "running" for `attempt_to_start`.
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: u32,
}

impl Default for TaskGateConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: default_stale_after_minutes(),
        }
    }
}

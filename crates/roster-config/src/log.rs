//! Logging settings.

use serde::{Deserialize, Serialize};

fn default_level() -> String {
    "warn".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Fallback filter directive when `ROSTER_LOG` is unset, e.g. `info` or
    /// `roster_db=debug,warn`.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

//! Database location and connection settings.

use serde::{Deserialize, Serialize};

fn default_path() -> String {
    "roster.db".to_string()
}

/// Default wait for the SQLite write lock, in milliseconds.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    /// How long a connection waits for a competing writer before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Whether the database lives only in this process.
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

//! Change audit settings.

use serde::{Deserialize, Serialize};

const fn default_enabled() -> bool {
    true
}

/// Free-text fields that never belong in a diff, whatever the entity.
fn default_excluded_fields() -> Vec<String> {
    vec!["comments".to_string()]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Whether audited entities produce change records at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Field names excluded from every diff, on top of per-schema exclusions.
    #[serde(default = "default_excluded_fields")]
    pub excluded_fields: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            excluded_fields: default_excluded_fields(),
        }
    }
}

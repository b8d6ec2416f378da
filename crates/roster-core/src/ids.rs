//! ID prefix constants.
//!
//! Every stored row gets an ID of the form `{prefix}-{8 hex chars}`.
//! Entity records use the `id_prefix` of their schema; the log tables use
//! the fixed prefixes below.

pub const PREFIX_CHANGE: &str = "chg";
pub const PREFIX_EVENT: &str = "evt";

/// Fixed prefixes owned by the store itself.
pub const ALL_PREFIXES: &[&str] = &[PREFIX_CHANGE, PREFIX_EVENT];

/// Check that `id` looks like `{prefix}-{8 lowercase hex}`.
#[must_use]
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|hex| {
            hex.len() == 8 && hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        })
}

//! Entity structs for Roster's stored rows.
//!
//! `EntityRecord` is the generic domain record described by an `EntitySchema`;
//! the rest are the store's own append-only log rows and the task gate row.
//! All structs derive `Serialize`, `Deserialize`, and `JsonSchema` for JSON
//! roundtrip and schema validation.

mod change;
mod event;
mod gate;
mod record;

pub use change::ChangeRecord;
pub use event::EventRecord;
pub use gate::{TaskGateEntry, TaskLease};
pub use record::{EntityRecord, Fields};

//! Repository modules implementing operations for all Roster stores.
//!
//! Each module adds methods to `RosterService` via `impl RosterService` blocks.

pub mod changes;
pub mod events;
pub mod records;
pub mod task_gate;

pub use changes::ChangeFilter;
pub use events::EventFilter;
pub use records::RecordQuery;

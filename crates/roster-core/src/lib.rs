//! # roster-core
//!
//! Core types, schema descriptors, and error types for Roster.
//!
//! This crate provides the foundational types shared across all Roster crates:
//! - Entity structs for stored rows (domain records, change and event logs, task gate)
//! - Per-entity schema descriptors with validation rules and the built-in catalog
//! - Field-level diffs used by the change audit recorder
//! - Operation and event-log enums
//! - ID prefix constants
//! - Cross-cutting error types
//! - Typed event payloads

pub mod audit_detail;
pub mod catalog;
pub mod diff;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod ids;
pub mod schema;

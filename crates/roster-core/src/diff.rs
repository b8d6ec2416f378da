//! Field-level diffs between two states of a record.
//!
//! A diff maps each changed field to its `{old, new}` pair. Create diffs carry
//! `old = null`, delete diffs carry `new = null`. Full values are kept for every
//! field, so applying a diff to the pre-state reproduces the post-state.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::Fields;

/// Old and new value of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Changed fields keyed by name, serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FieldDiff(BTreeMap<String, FieldChange>);

impl FieldDiff {
    /// Diff two field sets. Absent fields compare as `null`.
    #[must_use]
    pub fn between(before: &Fields, after: &Fields) -> Self {
        let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        let mut changes = BTreeMap::new();
        for name in names {
            let old = before.get(name).unwrap_or(&Value::Null);
            let new = after.get(name).unwrap_or(&Value::Null);
            if old != new {
                changes.insert(
                    name.clone(),
                    FieldChange {
                        old: old.clone(),
                        new: new.clone(),
                    },
                );
            }
        }
        Self(changes)
    }

    /// Diff for a newly created record: every non-null field, `old = null`.
    #[must_use]
    pub fn for_create(after: &Fields) -> Self {
        Self::between(&Fields::new(), after)
    }

    /// Diff for a deleted record: every non-null field, `new = null`.
    #[must_use]
    pub fn for_delete(before: &Fields) -> Self {
        Self::between(before, &Fields::new())
    }

    /// Drop excluded fields.
    #[must_use]
    pub fn without(mut self, excluded: &BTreeSet<String>) -> Self {
        self.0.retain(|name, _| !excluded.contains(name));
        self
    }

    /// Write every `new` value into `state`.
    pub fn apply_to(&self, state: &mut Fields) {
        for (name, change) in &self.0 {
            state.insert(name.clone(), change.new.clone());
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    /// Names of changed fields, sorted.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

//! Per-entity schema descriptors.
//!
//! An `EntitySchema` is plain data: the field list with kinds and rules, which
//! fields may be mass-assigned, which must be unique, whether the entity is
//! audited, which fields stay out of audit diffs, and which child tables are
//! purged together with a record. The store is generic over these descriptors,
//! there is no per-entity code.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::Fields;
use crate::enums::FieldKind;
use crate::errors::{FieldViolation, SchemaError, ValidationError};

/// Columns every entity table carries; schemas may not declare them.
pub const RESERVED_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

/// Rule name reported for fields that are not part of the schema.
pub const RULE_UNKNOWN_FIELD: &str = "unknown_field";
/// Rule name reported when a value has the wrong JSON shape for its kind.
pub const RULE_KIND: &str = "kind";

// ---------------------------------------------------------------------------
// FieldRule
// ---------------------------------------------------------------------------

/// Declarative validation rule attached to a field.
///
/// Every rule except `Required` passes on `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    Required,
    MinLength { min: usize },
    MaxLength { max: usize },
    Email,
    /// Lowercase ASCII letters, digits, and inner dashes.
    Slug,
    /// Absolute `http` or `https` URL.
    Url,
    OneOf { values: Vec<String> },
    /// Inclusive numeric bounds.
    Range { min: i64, max: i64 },
}

impl FieldRule {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::MinLength { .. } => "min_length",
            Self::MaxLength { .. } => "max_length",
            Self::Email => "email",
            Self::Slug => "slug",
            Self::Url => "url",
            Self::OneOf { .. } => "one_of",
            Self::Range { .. } => "range",
        }
    }

    /// Check `value` against this rule.
    #[must_use]
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Self::Required => match value {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            },
            _ if value.is_null() => true,
            Self::MinLength { min } => value.as_str().is_none_or(|s| s.chars().count() >= *min),
            Self::MaxLength { max } => value.as_str().is_none_or(|s| s.chars().count() <= *max),
            Self::Email => value.as_str().is_some_and(is_email),
            Self::Slug => value.as_str().is_some_and(is_slug),
            Self::Url => value.as_str().is_some_and(is_url),
            Self::OneOf { values } => value
                .as_str()
                .is_some_and(|s| values.iter().any(|allowed| allowed == s)),
            Self::Range { min, max } => value
                .as_f64()
                .is_some_and(|n| n >= *min as f64 && n <= *max as f64),
        }
    }

    fn describe(&self, field: &str) -> String {
        match self {
            Self::Required => format!("{field} is required"),
            Self::MinLength { min } => format!("{field} must be at least {min} characters"),
            Self::MaxLength { max } => format!("{field} may not exceed {max} characters"),
            Self::Email => format!("{field} must be a valid email address"),
            Self::Slug => format!("{field} may only contain lowercase letters, digits and dashes"),
            Self::Url => format!("{field} must be an http(s) URL"),
            Self::OneOf { values } => format!("{field} must be one of: {}", values.join(", ")),
            Self::Range { min, max } => format!("{field} must be between {min} and {max}"),
        }
    }
}

fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    rest.is_some_and(|r| !r.is_empty() && !r.starts_with('/') && !r.chars().any(char::is_whitespace))
}

/// Check that `name` is a plain lowercase SQL identifier.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

// ---------------------------------------------------------------------------
// FieldSpec
// ---------------------------------------------------------------------------

/// One column of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub rules: Vec<FieldRule>,
    /// Whether mass assignment may set this field.
    pub fillable: bool,
    /// Whether the value must be unique across the table.
    #[serde(default)]
    pub unique: bool,
}

impl FieldSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            rules: Vec::new(),
            fillable: true,
            unique: false,
        }
    }

    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    #[must_use]
    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Real)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    #[must_use]
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Timestamp)
    }

    #[must_use]
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Json)
    }

    #[must_use]
    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn required(self) -> Self {
        self.rule(FieldRule::Required)
    }

    #[must_use]
    pub fn max_length(self, max: usize) -> Self {
        self.rule(FieldRule::MaxLength { max })
    }

    #[must_use]
    pub fn one_of(self, values: &[&str]) -> Self {
        self.rule(FieldRule::OneOf {
            values: values.iter().map(|v| (*v).to_string()).collect(),
        })
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Exclude this field from mass assignment.
    #[must_use]
    pub const fn guarded(mut self) -> Self {
        self.fillable = false;
        self
    }

    /// Violations of this field's kind and rules for `value`.
    fn violations(&self, value: &Value) -> Vec<FieldViolation> {
        if !self.kind.accepts(value) {
            return vec![FieldViolation::new(
                &self.name,
                RULE_KIND,
                format!("{} must be of type {}", self.name, self.kind),
            )];
        }
        self.rules
            .iter()
            .filter(|rule| !rule.check(value))
            .map(|rule| FieldViolation::new(&self.name, rule.name(), rule.describe(&self.name)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ChildRelation
// ---------------------------------------------------------------------------

/// Rows in `table` whose `foreign_key` column holds the parent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRelation {
    pub table: String,
    pub foreign_key: String,
}

// ---------------------------------------------------------------------------
// EntitySchema
// ---------------------------------------------------------------------------

/// Descriptor of one persisted entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Logical name used by callers, e.g. `document`.
    pub kind: String,
    /// SQL table holding the records.
    pub table: String,
    /// ID prefix, e.g. `doc` for `doc-a3f8b2c1`.
    pub id_prefix: String,
    pub fields: Vec<FieldSpec>,
    /// Whether mutations produce change records.
    #[serde(default)]
    pub audited: bool,
    /// Fields left out of change diffs (on top of the global exclusions).
    #[serde(default)]
    pub non_audited: Vec<String>,
    /// Field used by `find_by_natural_key`.
    #[serde(default)]
    pub natural_key: Option<String>,
    /// Child rows removed together with a record.
    #[serde(default)]
    pub children: Vec<ChildRelation>,
}

impl EntitySchema {
    #[must_use]
    pub fn new(kind: impl Into<String>, table: impl Into<String>, id_prefix: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            table: table.into(),
            id_prefix: id_prefix.into(),
            fields: Vec::new(),
            audited: false,
            non_audited: Vec::new(),
            natural_key: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub const fn audited(mut self) -> Self {
        self.audited = true;
        self
    }

    #[must_use]
    pub fn non_audited(mut self, field: impl Into<String>) -> Self {
        self.non_audited.push(field.into());
        self
    }

    #[must_use]
    pub fn natural_key(mut self, field: impl Into<String>) -> Self {
        self.natural_key = Some(field.into());
        self
    }

    #[must_use]
    pub fn child(mut self, table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.children.push(ChildRelation {
            table: table.into(),
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields with a uniqueness constraint.
    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.unique)
    }

    /// Check the descriptor itself: identifiers, duplicates, key references.
    ///
    /// # Errors
    ///
    /// Returns the first `SchemaError` found.
    pub fn validate_definition(&self) -> Result<(), SchemaError> {
        for ident in [&self.kind, &self.table] {
            if !is_identifier(ident) {
                return Err(SchemaError::InvalidIdentifier(ident.clone()));
            }
        }
        if self.id_prefix.is_empty() || !self.id_prefix.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(SchemaError::InvalidIdentifier(self.id_prefix.clone()));
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !is_identifier(&field.name) {
                return Err(SchemaError::InvalidIdentifier(field.name.clone()));
            }
            if RESERVED_COLUMNS.contains(&field.name.as_str()) {
                return Err(SchemaError::ReservedField {
                    kind: self.kind.clone(),
                    field: field.name.clone(),
                });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    kind: self.kind.clone(),
                    field: field.name.clone(),
                });
            }
        }

        for name in &self.non_audited {
            if self.field_spec(name).is_none() {
                return Err(SchemaError::UnknownField {
                    kind: self.kind.clone(),
                    field: name.clone(),
                });
            }
        }

        if let Some(key) = &self.natural_key {
            match self.field_spec(key) {
                None => {
                    return Err(SchemaError::UnknownField {
                        kind: self.kind.clone(),
                        field: key.clone(),
                    });
                }
                Some(spec) if !spec.unique => {
                    return Err(SchemaError::NaturalKeyNotUnique {
                        kind: self.kind.clone(),
                        field: key.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        for child in &self.children {
            for ident in [&child.table, &child.foreign_key] {
                if !is_identifier(ident) {
                    return Err(SchemaError::InvalidIdentifier(ident.clone()));
                }
            }
        }

        Ok(())
    }

    /// Apply mass-assignment rules to caller input.
    ///
    /// Returns the fillable subset and the names of guarded fields that were
    /// dropped. Names unknown to the schema are kept so validation can report them.
    #[must_use]
    pub fn mass_assign(&self, input: &Fields) -> (Fields, Vec<String>) {
        let mut kept = Fields::new();
        let mut dropped = Vec::new();
        for (name, value) in input {
            match self.field_spec(name) {
                Some(spec) if !spec.fillable => dropped.push(name.clone()),
                _ => {
                    kept.insert(name.clone(), value.clone());
                }
            }
        }
        (kept, dropped)
    }

    /// Complete field set for a new record: every declared field, `null` when absent.
    #[must_use]
    pub fn blank_fields(&self) -> Fields {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), Value::Null))
            .collect()
    }

    /// Rewrite declared field values into their kind's canonical form.
    pub fn normalize_fields(&self, fields: &mut Fields) {
        for spec in &self.fields {
            if let Some(value) = fields.get_mut(&spec.name) {
                *value = spec.kind.normalize(value.take());
            }
        }
    }

    /// Validate a full field set against kinds and rules.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` listing every violation, including
    /// `unknown_field` for names the schema does not declare.
    pub fn validate_fields(&self, fields: &Fields) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        for name in fields.keys() {
            if self.field_spec(name).is_none() {
                violations.push(FieldViolation::new(
                    name,
                    RULE_UNKNOWN_FIELD,
                    format!("{name} is not a field of {}", self.kind),
                ));
            }
        }

        for spec in &self.fields {
            let value = fields.get(&spec.name).unwrap_or(&Value::Null);
            violations.extend(spec.violations(value));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                kind: self.kind.clone(),
                violations,
            })
        }
    }

    /// Fields excluded from diffs: the schema's own list plus `global`.
    #[must_use]
    pub fn audit_exclusions(&self, global: &[String]) -> BTreeSet<String> {
        self.non_audited
            .iter()
            .chain(global.iter())
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SchemaRegistry
// ---------------------------------------------------------------------------

/// Registered schemas keyed by entity kind.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, EntitySchema>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema after checking its definition.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` for an invalid definition or a kind that is
    /// already registered.
    pub fn register(&mut self, schema: EntitySchema) -> Result<(), SchemaError> {
        schema.validate_definition()?;
        if self.schemas.contains_key(&schema.kind) {
            return Err(SchemaError::DuplicateKind(schema.kind));
        }
        self.schemas.insert(schema.kind.clone(), schema);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&EntitySchema> {
        self.schemas.get(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

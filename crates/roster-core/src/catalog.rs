//! Built-in schemas for the volunteer-organization entities.
//!
//! Each entity is described as data. Callers register the whole catalog with
//! `RosterService::register_catalog` or pick individual schemas.

use crate::schema::{EntitySchema, FieldRule, FieldSpec};

pub const PERSON: &str = "person";
pub const DOCUMENT: &str = "document";
pub const AWARD: &str = "award";
pub const PERSON_AWARD: &str = "person_award";
pub const OAUTH_CLIENT: &str = "oauth_client";
pub const OAUTH_CODE: &str = "oauth_code";
pub const ALERT: &str = "alert";
pub const HANDLE: &str = "handle";
pub const SURVEY: &str = "survey";
pub const TIMESHEET: &str = "timesheet";

const PERSON_STATUSES: &[&str] = &[
    "prospective",
    "active",
    "inactive",
    "retired",
    "suspended",
    "resigned",
    "deceased",
];

/// Every built-in schema, parents before children.
#[must_use]
pub fn builtin() -> Vec<EntitySchema> {
    vec![
        person(),
        document(),
        award(),
        person_award(),
        oauth_client(),
        oauth_code(),
        alert(),
        handle(),
        survey(),
        timesheet(),
    ]
}

#[must_use]
pub fn person() -> EntitySchema {
    EntitySchema::new(PERSON, "people", "per")
        .field(FieldSpec::text("callsign").required().max_length(64).unique())
        .field(FieldSpec::text("first_name").required().max_length(100))
        .field(FieldSpec::text("last_name").required().max_length(100))
        .field(
            FieldSpec::text("email")
                .required()
                .rule(FieldRule::Email)
                .max_length(255)
                .unique(),
        )
        .field(FieldSpec::text("status").one_of(PERSON_STATUSES).guarded())
        .field(FieldSpec::text("comments"))
        .audited()
        .natural_key("callsign")
        .child("person_awards", "person_id")
        .child("timesheets", "person_id")
}

#[must_use]
pub fn document() -> EntitySchema {
    EntitySchema::new(DOCUMENT, "documents", "doc")
        .field(
            FieldSpec::text("tag")
                .required()
                .rule(FieldRule::Slug)
                .max_length(64)
                .unique(),
        )
        .field(FieldSpec::text("description").required().max_length(255))
        .field(FieldSpec::text("body").required())
        .audited()
        .natural_key("tag")
}

#[must_use]
pub fn award() -> EntitySchema {
    EntitySchema::new(AWARD, "awards", "awd")
        .field(FieldSpec::text("title").required().max_length(128).unique())
        .field(FieldSpec::text("description").required())
        .field(FieldSpec::text("icon").max_length(64))
        .field(FieldSpec::boolean("awards_points"))
        .audited()
        .natural_key("title")
        .child("person_awards", "award_id")
}

#[must_use]
pub fn person_award() -> EntitySchema {
    EntitySchema::new(PERSON_AWARD, "person_awards", "pwd")
        .field(FieldSpec::text("person_id").required())
        .field(FieldSpec::text("award_id").required())
        .field(FieldSpec::integer("year").rule(FieldRule::Range { min: 1990, max: 2100 }))
        .field(FieldSpec::text("notes"))
        .audited()
        .non_audited("notes")
}

#[must_use]
pub fn oauth_client() -> EntitySchema {
    EntitySchema::new(OAUTH_CLIENT, "oauth_clients", "oac")
        .field(
            FieldSpec::text("client_id")
                .required()
                .rule(FieldRule::Slug)
                .max_length(64)
                .unique(),
        )
        .field(FieldSpec::text("description").required())
        .field(FieldSpec::text("secret").guarded())
        .field(FieldSpec::text("redirect_url").required().rule(FieldRule::Url))
        .audited()
        .non_audited("secret")
        .natural_key("client_id")
        .child("oauth_codes", "oauth_client_id")
}

#[must_use]
pub fn oauth_code() -> EntitySchema {
    EntitySchema::new(OAUTH_CODE, "oauth_codes", "ocd")
        .field(FieldSpec::text("code").required().unique())
        .field(FieldSpec::text("oauth_client_id").required())
        .field(FieldSpec::text("person_id").required())
        .field(FieldSpec::text("scope"))
        .field(FieldSpec::timestamp("expires_at"))
        .natural_key("code")
}

#[must_use]
pub fn alert() -> EntitySchema {
    EntitySchema::new(ALERT, "alerts", "alr")
        .field(FieldSpec::text("title").required().max_length(128))
        .field(FieldSpec::text("description").required())
        .field(FieldSpec::boolean("on_playa"))
        .audited()
}

#[must_use]
pub fn handle() -> EntitySchema {
    EntitySchema::new(HANDLE, "handles", "hdl")
        .field(FieldSpec::text("name").required().max_length(100).unique())
        .field(FieldSpec::text("comment"))
        .field(FieldSpec::text("entity_type").max_length(64))
        .audited()
        .non_audited("comment")
        .natural_key("name")
}

#[must_use]
pub fn survey() -> EntitySchema {
    EntitySchema::new(SURVEY, "surveys", "srv")
        .field(
            FieldSpec::text("slug")
                .required()
                .rule(FieldRule::Slug)
                .max_length(128)
                .unique(),
        )
        .field(FieldSpec::text("title").required().max_length(255))
        .field(FieldSpec::integer("year").required().rule(FieldRule::Range { min: 2000, max: 2100 }))
        .field(FieldSpec::text("survey_type").required().one_of(&["trainer", "training", "alpha"]))
        .field(FieldSpec::text("prologue"))
        .field(FieldSpec::text("epilogue"))
        .field(FieldSpec::json("questions"))
        .audited()
        .non_audited("prologue")
        .non_audited("epilogue")
        .natural_key("slug")
}

#[must_use]
pub fn timesheet() -> EntitySchema {
    EntitySchema::new(TIMESHEET, "timesheets", "tms")
        .field(FieldSpec::text("person_id").required())
        .field(FieldSpec::integer("position_id").required())
        .field(FieldSpec::timestamp("on_duty").required())
        .field(FieldSpec::timestamp("off_duty"))
        .field(
            FieldSpec::text("review_status")
                .one_of(&["pending", "approved", "rejected", "verified"])
                .guarded(),
        )
        .field(FieldSpec::text("notes"))
        .audited()
        .non_audited("notes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn every_builtin_schema_is_valid() {
        let mut registry = SchemaRegistry::new();
        for schema in builtin() {
            registry.register(schema).unwrap();
        }
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn child_tables_are_builtin_tables() {
        let schemas = builtin();
        for schema in &schemas {
            for child in &schema.children {
                let target = schemas
                    .iter()
                    .find(|s| s.table == child.table)
                    .unwrap_or_else(|| panic!("{} has unknown child {}", schema.kind, child.table));
                assert!(
                    target.field_spec(&child.foreign_key).is_some(),
                    "{} lacks foreign key {}",
                    target.kind,
                    child.foreign_key
                );
            }
        }
    }

    #[test]
    fn unique_natural_keys() {
        assert_eq!(document().natural_key.as_deref(), Some("tag"));
        assert_eq!(oauth_client().natural_key.as_deref(), Some("client_id"));
        assert!(alert().natural_key.is_none());
    }
}

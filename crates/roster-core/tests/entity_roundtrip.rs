//! Serde roundtrip and JsonSchema validation tests for all entity types.

use chrono::Utc;
use schemars::schema_for;
use serde_json::json;
use roster_core::audit_detail::{ContactDetail, EmailChangedDetail, StatusChangedDetail};
use roster_core::diff::FieldDiff;
use roster_core::entities::*;
use roster_core::enums::*;

/// Validate a JSON value against a schemars-generated schema.
fn validate_against_schema(
    schema: &serde_json::Value,
    instance: &serde_json::Value,
) -> Vec<String> {
    let validator = jsonschema::validator_for(schema).expect("schema should be valid");
    validator
        .iter_errors(instance)
        .map(|e| format!("{e}"))
        .collect()
}

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().expect("object")
}

macro_rules! roundtrip_and_validate {
    ($name:ident, $ty:ty, $instance:expr) => {
        #[test]
        fn $name() {
            let val: $ty = $instance;

            // Serde roundtrip
            let json_str = serde_json::to_string_pretty(&val).unwrap();
            let recovered: $ty = serde_json::from_str(&json_str).unwrap();
            assert_eq!(
                recovered,
                val,
                "serde roundtrip failed for {}",
                stringify!($ty)
            );

            // Schema validation
            let schema = serde_json::to_value(schema_for!($ty)).unwrap();
            let instance = serde_json::to_value(&val).unwrap();
            let errors = validate_against_schema(&schema, &instance);
            assert!(
                errors.is_empty(),
                "Schema validation failed for {}: {:?}",
                stringify!($ty),
                errors
            );
        }
    };
}

roundtrip_and_validate!(
    entity_record_roundtrip,
    EntityRecord,
    EntityRecord {
        id: "doc-a3f8b2c1".into(),
        kind: "document".into(),
        fields: fields(json!({
            "tag": "ranger-manual",
            "description": "The Ranger Manual",
            "body": "Be a calm presence.",
        })),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
);

roundtrip_and_validate!(
    change_record_roundtrip,
    ChangeRecord,
    ChangeRecord {
        id: "chg-00c0ffee".into(),
        seq: 7,
        table_name: "people".into(),
        record_id: "per-1234abcd".into(),
        operation: ChangeOperation::Modify,
        changes: FieldDiff::between(
            &fields(json!({"status": "active", "email": "a@example.org"})),
            &fields(json!({"status": "inactive", "email": "a@example.org"})),
        ),
        actor_id: Some("per-99999999".into()),
        created_at: Utc::now(),
    }
);

roundtrip_and_validate!(
    change_record_without_actor_roundtrip,
    ChangeRecord,
    ChangeRecord {
        id: "chg-00c0ffef".into(),
        seq: 8,
        table_name: "documents".into(),
        record_id: "doc-1234abcd".into(),
        operation: ChangeOperation::Delete,
        changes: FieldDiff::for_delete(&fields(json!({"tag": "old"}))),
        actor_id: None,
        created_at: Utc::now(),
    }
);

roundtrip_and_validate!(
    event_record_roundtrip,
    EventRecord,
    EventRecord {
        id: "evt-a3f8b2c1".into(),
        seq: 1,
        log: EventLog::Contact,
        subject_ids: vec!["per-00000001".into(), "per-00000002".into()],
        action: "message".into(),
        message: Some("Asked about shift coverage".into()),
        payload: Some(json!({"method": "email"})),
        actor_id: None,
        created_at: Utc::now(),
    }
);

roundtrip_and_validate!(
    task_gate_entry_roundtrip,
    TaskGateEntry,
    TaskGateEntry {
        task_name: "sync-photos".into(),
        last_started_at: Utc::now(),
        lease_owner: Some("worker-1".into()),
        lease_expires_at: Some(Utc::now()),
    }
);

roundtrip_and_validate!(
    task_lease_roundtrip,
    TaskLease,
    TaskLease {
        task_name: "import-reviews".into(),
        owner: "worker-2".into(),
        expires_at: Utc::now(),
    }
);

roundtrip_and_validate!(
    status_changed_detail_roundtrip,
    StatusChangedDetail,
    StatusChangedDetail {
        from: "active".into(),
        to: "inactive".into(),
        reason: Some("did not work last season".into()),
    }
);

roundtrip_and_validate!(
    email_changed_detail_roundtrip,
    EmailChangedDetail,
    EmailChangedDetail {
        old_email: None,
        new_email: "ranger@example.org".into(),
    }
);

roundtrip_and_validate!(
    contact_detail_roundtrip,
    ContactDetail,
    ContactDetail {
        method: "phone".into(),
        subject: None,
    }
);

//! Entity store + change audit integration tests.
//!
//! - Create/update/delete produce change records with the right diffs
//! - Excluded and non-audited fields never reach the change log
//! - Replaying a record's changes reproduces its audited state
//! - Audit failures do not undo entity writes
//! - Custom schemas registered at runtime behave like built-ins

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;

use roster_core::catalog;
use roster_core::entities::Fields;
use roster_core::enums::ChangeOperation;
use roster_core::schema::{EntitySchema, FieldSpec};
use roster_db::error::DatabaseError;
use roster_db::repos::{ChangeFilter, RecordQuery};
use roster_db::service::RosterService;

const ADMIN: Option<&str> = Some("per-0000ad01");

async fn test_service() -> RosterService {
    let mut svc = RosterService::new_local(":memory:").await.unwrap();
    svc.register_catalog().await.unwrap();
    svc
}

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap()
}

fn person(callsign: &str) -> Fields {
    fields(json!({
        "callsign": callsign,
        "first_name": "Alex",
        "last_name": "Doe",
        "email": format!("{}@example.org", callsign.to_lowercase()),
        "comments": "met at orientation",
    }))
}

/// Drop nulls and excluded names so stored state compares with replayed state.
fn audited_view(record: &Fields, excluded: &[&str]) -> Fields {
    record
        .iter()
        .filter(|(name, value)| !value.is_null() && !excluded.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Change records per operation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_records_every_audited_field() {
    let svc = test_service().await;
    let created = svc.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();

    let history = svc
        .query_changes(&ChangeFilter::for_record("people", &created.id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let change = &history[0];
    assert_eq!(change.operation, ChangeOperation::Create);
    assert_eq!(change.actor_id.as_deref(), ADMIN);
    assert_eq!(
        change.changes.fields().collect::<Vec<_>>(),
        vec!["callsign", "email", "first_name", "last_name"]
    );
    assert_eq!(change.changes.get("callsign").unwrap().old, Value::Null);
    assert_eq!(change.changes.get("callsign").unwrap().new, json!("Khaki"));
}

#[tokio::test]
async fn update_records_only_dirty_fields() {
    let svc = test_service().await;
    let created = svc.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();
    svc.update_record(None, catalog::PERSON, &created.id, &fields(json!({"last_name": "Smith"})))
        .await
        .unwrap();

    let modifies = svc
        .query_changes(&ChangeFilter {
            operation: Some(ChangeOperation::Modify),
            ..ChangeFilter::for_record("people", &created.id)
        })
        .await
        .unwrap();
    assert_eq!(modifies.len(), 1);
    assert_eq!(modifies[0].changes.len(), 1);
    let change = modifies[0].changes.get("last_name").unwrap();
    assert_eq!(change.old, json!("Doe"));
    assert_eq!(change.new, json!("Smith"));
    assert!(modifies[0].actor_id.is_none());
}

#[tokio::test]
async fn change_json_shape() {
    let svc = test_service().await;
    let created = svc.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();
    svc.force_update_record(ADMIN, catalog::PERSON, &created.id, &fields(json!({"status": "active"})))
        .await
        .unwrap();

    let mut rows = svc
        .db()
        .conn()
        .query(
            "SELECT changes FROM change_log WHERE record_id = ?1 AND operation = 'modify'",
            [created.id.as_str()],
        )
        .await
        .unwrap();
    let row = rows.next().await.unwrap().unwrap();
    let stored: Value = serde_json::from_str(&row.get::<String>(0).unwrap()).unwrap();
    assert_eq!(stored, json!({"status": {"old": null, "new": "active"}}));
}

#[tokio::test]
async fn delete_records_old_values() {
    let svc = test_service().await;
    let created = svc.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();
    svc.delete_record(ADMIN, catalog::PERSON, &created.id).await.unwrap();

    let deletes = svc
        .query_changes(&ChangeFilter {
            operation: Some(ChangeOperation::Delete),
            ..ChangeFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(deletes.len(), 1);
    let email = deletes[0].changes.get("email").unwrap();
    assert_eq!(email.old, json!("khaki@example.org"));
    assert_eq!(email.new, Value::Null);
    assert!(deletes[0].changes.get("comments").is_none());
}

// ---------------------------------------------------------------------------
// Exclusions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn saving_only_excluded_fields_records_nothing() {
    let svc = test_service().await;
    let created = svc.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();
    let updated = svc
        .update_record(ADMIN, catalog::PERSON, &created.id, &fields(json!({"comments": "rewritten"})))
        .await
        .unwrap();
    assert_eq!(updated.get_str("comments"), Some("rewritten"));

    let history = svc
        .query_changes(&ChangeFilter::for_record("people", &created.id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1, "only the create should be recorded");
}

#[tokio::test]
async fn schema_non_audited_fields_are_excluded() {
    let svc = test_service().await;
    let person = svc.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();
    let sheet = svc
        .create_record(
            ADMIN,
            catalog::TIMESHEET,
            &fields(json!({
                "person_id": person.id,
                "position_id": 1,
                "on_duty": "2026-08-30T12:00:00Z",
                "notes": "late start",
            })),
        )
        .await
        .unwrap();
    svc.update_record(ADMIN, catalog::TIMESHEET, &sheet.id, &fields(json!({"notes": "late start, ok'd"})))
        .await
        .unwrap();

    let history = svc
        .query_changes(&ChangeFilter::for_record("timesheets", &sheet.id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].changes.get("notes").is_none());
    assert!(history[0].changes.get("on_duty").is_some());
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replaying_changes_reproduces_state() {
    let svc = test_service().await;
    let created = svc.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();
    svc.update_record(ADMIN, catalog::PERSON, &created.id, &fields(json!({"first_name": "Sam"})))
        .await
        .unwrap();
    svc.force_update_record(ADMIN, catalog::PERSON, &created.id, &fields(json!({"status": "inactive"})))
        .await
        .unwrap();
    let current = svc
        .update_record(ADMIN, catalog::PERSON, &created.id, &fields(json!({"email": "sam@example.org"})))
        .await
        .unwrap();

    let replayed = svc.replay_changes("people", &created.id).await.unwrap().unwrap();
    assert_eq!(replayed, audited_view(&current.fields, &["comments"]));
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audit_failure_keeps_entity_write() {
    let svc = test_service().await;
    let created = svc.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();

    svc.db().conn().execute("DROP TABLE change_log", ()).await.unwrap();

    let updated = svc
        .update_record(ADMIN, catalog::PERSON, &created.id, &fields(json!({"first_name": "Sam"})))
        .await
        .unwrap();
    assert_eq!(updated.get_str("first_name"), Some("Sam"));

    let stored = svc.get_record(catalog::PERSON, &created.id).await.unwrap();
    assert_eq!(stored.get_str("first_name"), Some("Sam"));

    svc.delete_record(ADMIN, catalog::PERSON, &created.id).await.unwrap();
    assert!(matches!(
        svc.get_record(catalog::PERSON, &created.id).await,
        Err(DatabaseError::NotFound { .. })
    ));
}

#[tokio::test]
async fn validation_failure_writes_nothing() {
    let svc = test_service().await;
    let created = svc.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();
    let err = svc
        .update_record(ADMIN, catalog::PERSON, &created.id, &fields(json!({"email": "nope"})))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Validation(ref v) if v.has("email", "email")));

    let stored = svc.get_record(catalog::PERSON, &created.id).await.unwrap();
    assert_eq!(stored.get_str("email"), Some("khaki@example.org"));
    let history = svc
        .query_changes(&ChangeFilter::for_record("people", &created.id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

// ---------------------------------------------------------------------------
// Cascades and custom schemas
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_oauth_client_cascades_codes() {
    let svc = test_service().await;
    let client = svc
        .create_record(
            ADMIN,
            catalog::OAUTH_CLIENT,
            &fields(json!({
                "client_id": "clubhouse",
                "description": "Clubhouse",
                "redirect_url": "https://example.org/callback",
            })),
        )
        .await
        .unwrap();
    for code in ["c1", "c2", "c3"] {
        svc.create_record(
            None,
            catalog::OAUTH_CODE,
            &fields(json!({"code": code, "oauth_client_id": client.id, "person_id": "per-00000001"})),
        )
        .await
        .unwrap();
    }

    svc.delete_record(ADMIN, catalog::OAUTH_CLIENT, &client.id).await.unwrap();

    let codes = svc
        .list_records(catalog::OAUTH_CODE, &RecordQuery::default())
        .await
        .unwrap();
    assert!(codes.is_empty());
}

#[tokio::test]
async fn custom_schema_without_children_tables() {
    let mut svc = RosterService::new_local(":memory:").await.unwrap();
    let schema = EntitySchema::new("vehicle", "vehicles", "veh")
        .field(FieldSpec::text("plate").required().unique())
        .field(FieldSpec::integer("seats"))
        .audited()
        .natural_key("plate")
        .child("vehicle_checkouts", "vehicle_id");
    svc.register_schema(schema).await.unwrap();

    let truck = svc
        .create_record(ADMIN, "vehicle", &fields(json!({"plate": "RNGR-1", "seats": 3})))
        .await
        .unwrap();
    assert_eq!(truck.get_i64("seats"), Some(3));

    let found = svc.find_by_natural_key("vehicle", "RNGR-1").await.unwrap().unwrap();
    assert_eq!(found.id, truck.id);

    svc.delete_record(ADMIN, "vehicle", &truck.id).await.unwrap();
    let history = svc
        .query_changes(&ChangeFilter::for_record("vehicles", &truck.id))
        .await
        .unwrap();
    let ops: Vec<_> = history.iter().map(|c| c.operation).collect();
    assert_eq!(ops, vec![ChangeOperation::Create, ChangeOperation::Delete]);
}

#[tokio::test]
async fn resaving_real_fields_records_nothing() {
    let mut svc = RosterService::new_local(":memory:").await.unwrap();
    let schema = EntitySchema::new("shift", "shifts", "shf")
        .field(FieldSpec::text("label").required())
        .field(FieldSpec::real("hours"))
        .audited();
    svc.register_schema(schema).await.unwrap();

    let input = fields(json!({"label": "Dawn", "hours": 2}));
    let created = svc.create_record(ADMIN, "shift", &input).await.unwrap();
    let stored = svc.get_record("shift", &created.id).await.unwrap();
    assert_eq!(created.fields, stored.fields);

    let resaved = svc.update_record(ADMIN, "shift", &created.id, &input).await.unwrap();
    assert_eq!(resaved.updated_at, created.updated_at);

    let history = svc
        .query_changes(&ChangeFilter::for_record("shifts", &created.id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].operation, ChangeOperation::Create);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_deletes_record_one_change() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roster.db").to_string_lossy().into_owned();

    let mut a = RosterService::new_local(&path).await.unwrap();
    a.register_catalog().await.unwrap();
    let mut b = RosterService::new_local(&path).await.unwrap();
    b.register_catalog().await.unwrap();

    let created = a.create_record(ADMIN, catalog::PERSON, &person("Khaki")).await.unwrap();
    let id_a = created.id.clone();
    let id_b = created.id.clone();

    let first = tokio::spawn(async move { a.delete_record(ADMIN, catalog::PERSON, &id_a).await });
    let second = tokio::spawn(async move { b.delete_record(ADMIN, catalog::PERSON, &id_b).await });
    let outcomes = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(DatabaseError::NotFound { .. })))
    );

    let observer = RosterService::new_local(&path).await.unwrap();
    let deletes = observer
        .query_changes(&ChangeFilter {
            operation: Some(ChangeOperation::Delete),
            ..ChangeFilter::for_record("people", &created.id)
        })
        .await
        .unwrap();
    assert_eq!(deletes.len(), 1);
}

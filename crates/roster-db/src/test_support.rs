//! Shared test utilities for roster-db unit tests.

pub(crate) mod helpers {
    use roster_config::{AuditConfig, TaskGateConfig};
    use roster_core::entities::Fields;

    use crate::RosterDb;
    use crate::service::RosterService;

    /// Create an in-memory `RosterService` with the built-in catalog registered.
    pub async fn test_service() -> RosterService {
        test_service_with(AuditConfig::default()).await
    }

    /// Same as [`test_service`] with specific audit settings.
    pub async fn test_service_with(audit: AuditConfig) -> RosterService {
        let db = RosterDb::open_local(":memory:").await.unwrap();
        let mut svc = RosterService::from_db(db, audit, TaskGateConfig::default());
        svc.register_catalog().await.unwrap();
        svc
    }

    /// Build a field map from a JSON object literal.
    pub fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    /// Valid input for a new person.
    pub fn person_input(callsign: &str) -> Fields {
        fields(serde_json::json!({
            "callsign": callsign,
            "first_name": "Test",
            "last_name": "Ranger",
            "email": format!("{}@example.org", callsign.to_lowercase()),
        }))
    }
}

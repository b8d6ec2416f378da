//! Integration tests for TOML configuration loading.
//!
//! Uses figment::Jail for safe, sandboxed env var and file manipulation.

use figment::{
    Figment, Jail,
    providers::{Format, Serialized, Toml},
};
use pretty_assertions::assert_eq;
use roster_config::RosterConfig;

#[test]
fn loads_database_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[database]
path = "/var/lib/roster/roster.db"
busy_timeout_ms = 12000
"#,
        )?;

        let config: RosterConfig = Figment::from(Serialized::defaults(RosterConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.database.path, "/var/lib/roster/roster.db");
        assert_eq!(config.database.busy_timeout_ms, 12_000);
        Ok(())
    });
}

#[test]
fn loads_audit_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[audit]
enabled = false
excluded_fields = ["comments", "internal_notes"]
"#,
        )?;

        let config: RosterConfig = Figment::from(Serialized::defaults(RosterConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert!(!config.audit.enabled);
        assert_eq!(config.audit.excluded_fields, vec!["comments", "internal_notes"]);
        Ok(())
    });
}

#[test]
fn partial_sections_keep_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[task_gate]
stale_after_minutes = 15
"#,
        )?;

        let config: RosterConfig = Figment::from(Serialized::defaults(RosterConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.task_gate.stale_after_minutes, 15);
        assert_eq!(config.database.path, "roster.db");
        assert!(config.audit.enabled);
        assert_eq!(config.log.level, "warn");
        Ok(())
    });
}

#[test]
fn project_local_file_is_picked_up_by_load() {
    Jail::expect_with(|jail| {
        jail.create_dir(".roster")?;
        jail.create_file(
            ".roster/config.toml",
            r#"
[log]
level = "roster_db=debug,info"
"#,
        )?;

        let config = RosterConfig::load().expect("config loads");
        assert_eq!(config.log.level, "roster_db=debug,info");
        Ok(())
    });
}

#[test]
fn load_rejects_invalid_values() {
    Jail::expect_with(|jail| {
        jail.create_dir(".roster")?;
        jail.create_file(
            ".roster/config.toml",
            r#"
[task_gate]
stale_after_minutes = 0
"#,
        )?;

        assert!(RosterConfig::load().is_err());
        Ok(())
    });
}

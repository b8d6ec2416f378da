use figment::Jail;
use pretty_assertions::assert_eq;
use roster_config::RosterConfig;

#[test]
fn env_vars_map_to_nested_sections() {
    Jail::expect_with(|jail| {
        jail.set_env("ROSTER_DATABASE__PATH", "/tmp/from-env.db");
        jail.set_env("ROSTER_TASK_GATE__STALE_AFTER_MINUTES", "10");
        jail.set_env("ROSTER_AUDIT__ENABLED", "false");

        let config = RosterConfig::load().expect("config loads");
        assert_eq!(config.database.path, "/tmp/from-env.db");
        assert_eq!(config.task_gate.stale_after_minutes, 10);
        assert!(!config.audit.enabled);
        Ok(())
    });
}

#[test]
fn env_beats_project_file() {
    Jail::expect_with(|jail| {
        jail.create_dir(".roster")?;
        jail.create_file(
            ".roster/config.toml",
            r#"
[database]
path = "from-file.db"
"#,
        )?;
        jail.set_env("ROSTER_DATABASE__PATH", "from-env.db");

        let config = RosterConfig::load().expect("config loads");
        assert_eq!(config.database.path, "from-env.db");
        Ok(())
    });
}

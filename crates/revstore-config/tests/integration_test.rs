//! Integration tests for revstore-config
//!
//! These tests verify config loading with real file system operations.

use std::path::PathBuf;
use tempfile::tempdir;

use revstore_config::{Config, ConfigError, RevisionPolicy};

#[test]
fn test_load_config_from_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");

    let config_content = r#"
[repository]
repository_path = "/custom/repository"
repository_permissions = 493
next_id = 1000

[resolve]
latest = "highest"

[write]
cleanup_on_failure = true

[logging]
level = "debug"
"#;
    std::fs::write(&path, config_content).unwrap();

    let config = Config::load_from(&path).unwrap();

    assert_eq!(
        config.repository.repository_path,
        PathBuf::from("/custom/repository")
    );
    assert_eq!(config.repository.repository_permissions, 0o755);
    assert_eq!(config.repository.next_id, 1000);
    assert_eq!(config.resolve.latest, RevisionPolicy::Highest);
    assert!(config.write.cleanup_on_failure);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_project_file_overrides_global_file() {
    let temp = tempdir().unwrap();

    let global = temp.path().join("global.toml");
    std::fs::write(
        &global,
        "[repository]\nrepository_path = \"/srv/global\"\nnext_id = 50\n",
    )
    .unwrap();

    let project = temp.path().join("project.toml");
    std::fs::write(&project, "[resolve]\nlatest = \"highest\"\n").unwrap();

    let mut config = Config::load_from(&global).unwrap();
    config.merge(Config::load_from(&project).unwrap());

    assert_eq!(config.repository.repository_path, PathBuf::from("/srv/global"));
    assert_eq!(config.repository.next_id, 50);
    assert_eq!(config.resolve.latest, RevisionPolicy::Highest);
}

#[test]
fn test_project_file_can_restore_a_default() {
    let temp = tempdir().unwrap();

    let global = temp.path().join("global.toml");
    std::fs::write(
        &global,
        "[repository]\nnext_id = 50\n\n[resolve]\nlatest = \"highest\"\n",
    )
    .unwrap();

    let project = temp.path().join("project.toml");
    std::fs::write(&project, "[resolve]\nlatest = \"lowest\"\n").unwrap();

    let config = Config::load_layered(&[&global, &project]).unwrap();
    assert_eq!(config.resolve.latest, RevisionPolicy::Lowest);
    assert_eq!(config.repository.next_id, 50);
}

#[test]
fn test_zero_next_id_in_file_is_rejected() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[repository]\nnext_id = 0\n").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            key: "repository.next_id",
            ..
        }
    ));
}

#[test]
fn test_invalid_toml_is_reported() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "[repository\nnext_id = ").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn test_unknown_policy_is_rejected() {
    let result: Result<Config, _> = toml::from_str("[resolve]\nlatest = \"newest\"\n");
    assert!(result.is_err());
}

#[test]
fn test_missing_file_is_io_error() {
    let temp = tempdir().unwrap();
    let err = Config::load_from(temp.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

/// The only test in this binary that touches process environment.
#[test]
fn test_env_overrides() {
    std::env::set_var("REVSTORE_REPOSITORY", "/env/repo");
    std::env::set_var("REVSTORE_PERMISSIONS", "0o750");
    std::env::set_var("REVSTORE_NEXT_ID", "77");

    let mut config = Config::default();
    let applied = config.apply_env_overrides();

    std::env::set_var("REVSTORE_NEXT_ID", "0");
    let mut rejected = Config::default();
    let zero = rejected.apply_env_overrides();

    std::env::remove_var("REVSTORE_REPOSITORY");
    std::env::remove_var("REVSTORE_PERMISSIONS");
    std::env::remove_var("REVSTORE_NEXT_ID");

    applied.unwrap();
    assert_eq!(config.repository.repository_path, PathBuf::from("/env/repo"));
    assert_eq!(config.repository.repository_permissions, 0o750);
    assert_eq!(config.repository.next_id, 77);

    assert!(matches!(
        zero,
        Err(ConfigError::InvalidValue {
            key: "REVSTORE_NEXT_ID",
            ..
        })
    ));
}

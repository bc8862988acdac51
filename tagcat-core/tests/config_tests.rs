//! Tests for data folder resolution

use serial_test::serial;
use tagcat_core::config::{database_path, resolve_data_folder, DATA_ENV_VAR};

#[test]
#[serial]
fn test_cli_argument_takes_priority() {
    std::env::set_var(DATA_ENV_VAR, "/tmp/from-env");
    let folder = resolve_data_folder(Some("/tmp/from-cli")).unwrap();
    assert_eq!(folder.to_str(), Some("/tmp/from-cli"));
    std::env::remove_var(DATA_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_variable_used_when_no_cli_arg() {
    std::env::set_var(DATA_ENV_VAR, "/tmp/from-env");
    let folder = resolve_data_folder(None).unwrap();
    assert_eq!(folder.to_str(), Some("/tmp/from-env"));
    std::env::remove_var(DATA_ENV_VAR);
}

#[test]
#[serial]
fn test_fallback_resolution_produces_some_folder() {
    std::env::remove_var(DATA_ENV_VAR);
    // Without overrides resolution still succeeds (config file or OS default)
    let folder = resolve_data_folder(None).unwrap();
    assert!(!folder.as_os_str().is_empty());
}

#[test]
fn test_database_path_is_inside_data_folder() {
    let db = database_path(std::path::Path::new("/srv/tagcat"));
    assert_eq!(db.to_str(), Some("/srv/tagcat/tagcat.db"));
}

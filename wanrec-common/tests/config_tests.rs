//! Root folder and config file resolution tests
//!
//! These mutate process environment variables, so they run serially.

use serial_test::serial;
use std::io::Write;
use std::path::{Path, PathBuf};
use wanrec_common::config::{
    resolve_root_folder, TomlConfig, CONFIG_ENV_VAR, ROOT_FOLDER_ENV_VAR,
};

#[test]
#[serial]
fn cli_argument_wins_over_environment_and_toml() {
    std::env::set_var(ROOT_FOLDER_ENV_VAR, "/env/root");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/toml/root")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/cli/root")), &config);
    std::env::remove_var(ROOT_FOLDER_ENV_VAR);

    assert_eq!(resolved, PathBuf::from("/cli/root"));
}

#[test]
#[serial]
fn environment_wins_over_toml() {
    std::env::set_var(ROOT_FOLDER_ENV_VAR, "/env/root");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/toml/root")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(None, &config);
    std::env::remove_var(ROOT_FOLDER_ENV_VAR);

    assert_eq!(resolved, PathBuf::from("/env/root"));
}

#[test]
#[serial]
fn toml_used_when_nothing_else_set() {
    std::env::remove_var(ROOT_FOLDER_ENV_VAR);
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/toml/root")),
        ..Default::default()
    };

    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/toml/root"));
}

#[test]
#[serial]
fn default_root_folder_is_named_for_the_tool() {
    std::env::remove_var(ROOT_FOLDER_ENV_VAR);

    let resolved = resolve_root_folder(None, &TomlConfig::default());

    assert!(
        resolved.to_string_lossy().contains("wanrec"),
        "unexpected default root folder {}",
        resolved.display()
    );
}

#[test]
#[serial]
fn config_file_from_environment_variable() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "root_folder = \"/from/file\"\n[recon]\nworker_concurrency = 2").unwrap();

    std::env::set_var(CONFIG_ENV_VAR, file.path());
    let config = TomlConfig::load_or_default(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    let config = config.unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/from/file")));
    assert_eq!(config.recon_value("worker_concurrency").as_deref(), Some("2"));
}

#[test]
#[serial]
fn explicit_missing_config_file_is_an_error() {
    std::env::remove_var(CONFIG_ENV_VAR);

    let result = TomlConfig::load_or_default(Some(Path::new("/nonexistent/wanrec.toml")));

    assert!(result.is_err());
}

#[test]
#[serial]
fn malformed_config_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "root_folder = [unterminated").unwrap();

    let result = TomlConfig::load(file.path());

    assert!(result.is_err());
}

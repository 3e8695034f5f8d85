//! Configuration loading and environment override tests

use kiln_config::{ConfigError, ConfigLoader};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join("kiln.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

fn clear_env() {
    env::remove_var("KILN_GENERATED_DIR");
    env::remove_var("KILN_SEARCH_ROOTS");
}

#[test]
#[serial]
fn test_load_when_no_config_exists() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    let config = ConfigLoader::new().load_from_directory(temp_dir.path()).unwrap();

    assert!(!config.is_project());
    assert_eq!(config.base_dir(), temp_dir.path());
    assert_eq!(config.generated_dir_path(), temp_dir.path().join("bin/generated"));
}

#[test]
#[serial]
fn test_load_from_deep_subdirectory() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[project]
name = "blinky"

[packages]
search_roots = ["repos/core", "local"]
hash_ignore = ["build"]
"#,
    );
    let deep = temp_dir.path().join("local/apps/blinky/src");
    fs::create_dir_all(&deep).unwrap();

    let config = ConfigLoader::new().load_from_directory(&deep).unwrap();

    assert_eq!(config.project_name(), Some("blinky"));
    assert_eq!(
        config.search_root_paths(),
        vec![
            temp_dir.path().join("repos/core"),
            temp_dir.path().join("local")
        ]
    );
    assert_eq!(config.hash_ignore(), ["build".to_string()]);
}

#[test]
#[serial]
fn test_invalid_toml_reports_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[project\n");

    let err = ConfigLoader::new().load_from_directory(temp_dir.path()).unwrap_err();
    match err {
        ConfigError::TomlParseError { file, .. } => assert_eq!(file, path),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
#[serial]
fn test_env_override_generated_dir() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[build]\ngenerated_dir = \"gen\"\n");

    env::set_var("KILN_GENERATED_DIR", "out/generated");
    let config = ConfigLoader::new().load_from_directory(temp_dir.path()).unwrap();
    clear_env();

    assert_eq!(
        config.generated_dir_path(),
        temp_dir.path().join("out/generated")
    );
}

#[test]
#[serial]
fn test_env_override_search_roots() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    env::set_var("KILN_SEARCH_ROOTS", "a:b::c");
    let config = ConfigLoader::new().load_from_directory(temp_dir.path()).unwrap();
    clear_env();

    assert_eq!(
        config.search_root_paths(),
        vec![
            temp_dir.path().join("a"),
            temp_dir.path().join("b"),
            temp_dir.path().join("c")
        ]
    );
}

#[test]
#[serial]
fn test_env_override_is_validated() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    env::set_var("KILN_GENERATED_DIR", "/absolute");
    let result = ConfigLoader::new().load_from_directory(temp_dir.path());
    clear_env();

    assert!(matches!(result, Err(ConfigError::InvalidPath { .. })));
}

#[test]
#[serial]
fn test_without_env_ignores_overrides() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();

    env::set_var("KILN_SEARCH_ROOTS", "elsewhere");
    let config = ConfigLoader::new()
        .without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();
    clear_env();

    assert_eq!(config.search_root_paths()[0], temp_dir.path().join("apps"));
}

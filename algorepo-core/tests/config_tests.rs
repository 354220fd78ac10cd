//! Configuration loading and validation tests.

use std::fs;
use std::path::Path;

use algorepo_core::{config, ConfigError, RepositoryConfig, SourceKind};
use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rstest::rstest;

const VALID: &str = r#"
remote_url: https://example.org/algorithms.git
branch: main
local_path: /tmp/algorepo-config-tests/wc
file_pattern: '.*\.java|.*\.R'
start_watcher: true
"#;

fn without(field: &str) -> String {
    VALID
        .lines()
        .filter(|line| !line.starts_with(field))
        .collect::<Vec<_>>()
        .join("\n")
}

#[rstest]
#[case("remote_url")]
#[case("branch")]
#[case("local_path")]
#[case("file_pattern")]
#[case("start_watcher")]
fn missing_field_is_configuration_error(#[case] field: &str) {
    let err = RepositoryConfig::from_yaml_str(&without(field), Path::new("inline")).unwrap_err();
    match err {
        ConfigError::MissingField { field: reported } => assert_eq!(reported, field),
        other => panic!("expected missing field, got {other:?}"),
    }
}

#[test]
fn blank_url_counts_as_missing() {
    let yaml = VALID.replace("https://example.org/algorithms.git", "'  '");
    let err = RepositoryConfig::from_yaml_str(&yaml, Path::new("inline")).unwrap_err();
    assert!(matches!(err, ConfigError::MissingField { field: "remote_url" }));
}

#[test]
fn invalid_pattern_is_reported_with_pattern() {
    let yaml = VALID.replace(r"'.*\.java|.*\.R'", "'(unclosed'");
    let err = RepositoryConfig::from_yaml_str(&yaml, Path::new("inline")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPattern { .. }), "got: {err}");
    assert!(err.to_string().contains("(unclosed"));
}

#[test]
fn load_at_reads_file_and_overrides() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config::config_path_at(home.path());
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(
        &path,
        format!("{VALID}extensions:\n  src: src\nsupported_versions: ['2.0.0']\n"),
    )
    .expect("write");

    home.child(".algorepo/repository.yaml")
        .assert(predicate::path::exists());

    let cfg = RepositoryConfig::load_at(&path).expect("load");
    assert!(cfg.start_watcher);
    assert_eq!(cfg.supported_versions, vec!["2.0.0".to_string()]);
    assert_eq!(
        cfg.extensions.get("src"),
        Some(&SourceKind::Custom("src".to_string()))
    );
}

#[test]
fn load_missing_file_is_io_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config::config_path_at(home.path());
    let err = RepositoryConfig::load_at(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("repository.yaml"));
}

#[test]
fn corrupt_yaml_is_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("broken.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = RepositoryConfig::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("broken.yaml"));
}

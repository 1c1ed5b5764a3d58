//! Configuration loading from disk

use hoard_core::{HoardConfig, HoardError, LogLevel};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[cache]
enabled = true

[cache.refresh]
enabled = true
intervalMinutes = 10
delayMinutes = 1

[logging]
enabled = true
level = "WARN"
"#
    )
    .unwrap();

    let config = HoardConfig::load(file.path()).unwrap();

    assert!(config.cache.refresh.enabled);
    assert_eq!(config.cache.refresh.interval_minutes, 10);
    assert_eq!(config.cache.refresh.delay_minutes, 1);
    assert_eq!(config.logging.level, LogLevel::Warn);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = HoardConfig::load(&dir.path().join("hoard.toml")).unwrap();
    assert_eq!(config, HoardConfig::default());
}

#[test]
fn test_parse_error_reports_path() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[logging]\nlevel = \"LOUD\"").unwrap();

    let err = HoardConfig::load(file.path()).unwrap_err();
    match err {
        HoardError::ConfigParse { path, .. } => assert_eq!(path, file.path()),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_directory_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = HoardConfig::load(dir.path()).unwrap_err();
    assert!(matches!(err, HoardError::ConfigRead { .. }));
}

use starkeys::config::{Settings, SettingsError};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_settings_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("starkeys.toml");
    fs::write(
        &path,
        r#"
[store]
path = "/data/warehouse.db"

[keys]
missing_key_sentinel = -9
bk_prefix = "nk"
"#,
    )
    .unwrap();

    let settings = Settings::from_file(&path).unwrap();

    assert_eq!(
        settings.store.resolved_path().unwrap(),
        Some("/data/warehouse.db".into())
    );
    assert_eq!(settings.keys.missing_key_sentinel, -9);
    assert_eq!(settings.keys.bk_column_for("customer"), "nk_customer");
    assert_eq!(settings.keys.pk_column_for("customer"), "key_customer");
}

#[test]
fn test_store_path_expands_environment() {
    std::env::set_var("STARKEYS_SETTINGS_TEST_DIR", "/srv/dw");
    let settings =
        Settings::from_toml("[store]\npath = \"${STARKEYS_SETTINGS_TEST_DIR}/keys.db\"\n").unwrap();

    assert_eq!(
        settings.store.resolved_path().unwrap(),
        Some("/srv/dw/keys.db".into())
    );
    std::env::remove_var("STARKEYS_SETTINGS_TEST_DIR");
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = Settings::from_file(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(SettingsError::FileNotFound(_))));
}

#[test]
fn test_malformed_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[keys\nseparator = 1").unwrap();

    assert!(matches!(
        Settings::from_file(&path),
        Err(SettingsError::ParseError(_))
    ));
}

#[test]
fn test_positive_sentinel_rejected() {
    let result = Settings::from_toml("[keys]\nmissing_key_sentinel = 1\n");
    assert!(matches!(result, Err(SettingsError::InvalidConfig(_))));
}

#[test]
fn test_hash_separator_in_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("starkeys.toml");
    fs::write(
        &path,
        r##"
[keys]
separator = "#"
"##,
    )
    .unwrap();

    let settings = Settings::from_file(&path).unwrap();

    assert_eq!(settings.keys.separator, "#");
}

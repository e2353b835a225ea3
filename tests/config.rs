use assert_matches::assert_matches;

use moth_catalog::config::{Config, ConfigLoader, DEFAULT_TOKEN_ENV, DriveConfig};
use moth_catalog::error::CatalogError;

#[test]
fn defaults_without_file_sections() {
    let resolved = ConfigLoader::resolve_config(Config::default());
    assert_eq!(resolved.schema_version, 1);
    assert_eq!(resolved.data_dir, None);
    assert!(!resolved.persist_folder_cache);
    assert_eq!(resolved.drive, DriveConfig::default());
    assert_eq!(resolved.drive.token_env, DEFAULT_TOKEN_ENV);
}

#[test]
fn reads_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "data_dir": "/srv/moths",
            "persist_folder_cache": true,
            "drive": { "upload_base": "http://127.0.0.1:9/upload" }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.data_dir.as_deref().map(|dir| dir.as_str()), Some("/srv/moths"));
    assert!(resolved.persist_folder_cache);
    assert_eq!(resolved.drive.upload_base, "http://127.0.0.1:9/upload");
    assert_eq!(resolved.drive.api_base, DriveConfig::default().api_base);
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(CatalogError::ConfigRead(_))
    );
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ \"drive\": 5 }").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(CatalogError::ConfigParse(_))
    );
}

//! Integration tests for configuration management
//!
//! These tests verify that a config file on disk is loaded, defaulted,
//! validated and processed into a ready-to-use `Config`.

use spacecore_registry::config::Config;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_full_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let index_path = temp_dir.path().join("data").join("registry.db");

    let toml_content = format!(
        r#"
[core]
log_level = "debug"
data_dir = "{data_dir}"

[server]
listen_addr = "0.0.0.0:50051"

[content_store]
api_url = "http://ipfs.internal:5001"
fetch_timeout_secs = 10

[index]
path = "{index_path}"

[remote_pin]
enabled = false

[peers]
rendezvous = "staging-registry"
discovery_limit = 5

[registry]
list_limit = 5
operation_timeout_secs = 15
serialize_writes = true
reconcile_interval_secs = 0
"#,
        data_dir = data_dir.display(),
        index_path = index_path.display(),
    );

    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load_from_path(&config_path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert!(data_dir.exists(), "data directory should be created");
    assert_eq!(config.server.listen_addr, "0.0.0.0:50051");
    assert_eq!(config.content_store.fetch_timeout_secs, 10);
    assert!(!config.remote_pin.enabled);
    assert_eq!(config.peers.rendezvous, "staging-registry");
    assert_eq!(config.peers.discovery_limit, 5);
    assert_eq!(config.registry.list_limit, 5);
    assert!(config.registry.serialize_writes);
    assert!(config.registry.reconcile_interval().is_none());
    // Unset fields keep their defaults
    assert_eq!(config.registry.reconcile_grace_secs, 900);
}

#[test]
fn test_minimal_config_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "[core]\ndata_dir = \"{}\"\n",
            temp_dir.path().join("d").display()
        ),
    )
    .unwrap();

    let config = Config::load_from_path(&config_path).unwrap();
    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.server.listen_addr, "127.0.0.1:50051");
    assert_eq!(config.registry.list_limit, 10);
    assert_eq!(config.peers.rendezvous, "spacecore-registry");
    assert!(config.registry.reconcile_interval().is_some());
}

#[test]
fn test_invalid_values_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let cases = [
        "[core]\nlog_level = \"loud\"\n",
        "[content_store]\napi_url = \"ftp://ipfs\"\n",
        "[peers]\nrendezvous = \"  \"\n",
        "[registry]\noperation_timeout_secs = 0\n",
        "[registry]\nreconcile_grace_secs = 0\n",
        "[registry]\noperation_timeout_secs = 400\n",
        "[registry]\nlist_limit = 11\n",
    ];

    for case in cases {
        let toml_content = format!(
            "{}\n[index]\npath = \"{}\"\n",
            case,
            temp_dir.path().join("r.db").display()
        );
        fs::write(&config_path, toml_content).unwrap();
        let err = Config::load_from_path(&config_path);
        assert!(err.is_err(), "expected rejection for:\n{}", case);
    }
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[core\nlog_level = ").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

//! Tests for config module

use super::*;

#[test]
fn test_default_limits() {
    let config = BocConfig::default();
    assert_eq!(config.max_depth, 1024);
    assert_eq!(config.max_cells, 1 << 20);
    assert_eq!(config.max_roots, 16);
    assert!(config.verify_crc);
    assert_eq!(config.flags(), BocFlags::default());
}

#[test]
fn test_partial_json_fills_defaults() {
    let json = r#"{ "max_depth": 64, "write_crc32c": true }"#;
    let config: BocConfig = json.parse().unwrap();

    assert_eq!(config.max_depth, 64);
    assert_eq!(config.max_roots, 16);
    assert!(config.flags().has_crc32c);
    assert!(!config.flags().has_index);
}

#[test]
fn test_config_from_str_error() {
    let invalid_json = "{ invalid json }";
    let result = BocConfig::from_str(invalid_json);

    assert!(result.is_err());
}

#[test]
fn test_config_serialization_roundtrip() {
    let config = BocConfig {
        max_cells: 10,
        write_index: true,
        ..BocConfig::default()
    };

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: BocConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(config, deserialized);
}

#[test]
fn test_config_from_file() {
    let path = std::env::temp_dir().join(format!("boc-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "verify_crc": false }"#).unwrap();

    let config = BocConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(!config.verify_crc);
    assert!(BocConfig::from_file(&path).is_err());
}

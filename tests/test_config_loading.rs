use proxy_invalidate::{CacheInvalidator, InvalidationError, InvalidatorConfig, ProxyClient};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_example_config() {
    let config = InvalidatorConfig::from_file("invalidator.yaml");
    assert!(config.is_ok(), "Failed to load example config: {:?}", config.err());

    let config = config.unwrap();
    assert_eq!(config.servers, vec!["127.0.0.1:6081", "127.0.0.2:6081"]);
    assert_eq!(config.base_url.as_deref(), Some("www.example.com"));
    assert_eq!(config.request_timeout_secs, 10);
    assert_eq!(config.max_concurrent_requests, 8);
    assert_eq!(config.tags_header, "X-Cache-Tags");
    assert_eq!(config.default_ban_headers.len(), 1);
}

#[test]
fn test_load_minimal_config() {
    let file = write_config("servers: [127.0.0.1]\n");

    let config = InvalidatorConfig::from_file(file.path()).unwrap();
    assert_eq!(config.servers, vec!["127.0.0.1"]);
    // Check defaults are applied
    assert!(config.base_url.is_none());
    assert_eq!(config.request_timeout_secs, 10);
    assert_eq!(config.max_concurrent_requests, 8);
    assert_eq!(config.tags_header, "X-Cache-Tags");
}

#[test]
fn test_load_invalid_config() {
    let file = write_config("servers: [127.0.0.1]\nmax_concurrent_requests: 0\n");
    let config = InvalidatorConfig::from_file(file.path());
    assert!(config.is_err(), "Should fail validation for zero concurrency");

    let file = write_config("servers: [127.0.0.1\n");
    let config = InvalidatorConfig::from_file(file.path());
    assert!(matches!(config, Err(InvalidationError::ConfigError(_))));
}

#[test]
fn test_load_nonexistent_file() {
    let config = InvalidatorConfig::from_file("nonexistent.yaml");
    assert!(config.is_err(), "Should fail when file doesn't exist");
}

#[test]
fn test_client_from_config() {
    let file = write_config(
        r#"
servers:
  - 127.0.0.1:6081
  - http://10.0.0.2/
base_url: http://fos.lo/app
default_ban_headers:
  X-Url: "^/static/"
"#,
    );
    let config = InvalidatorConfig::from_file(file.path()).unwrap();
    let client = ProxyClient::from_config(&config).unwrap();

    assert_eq!(
        client.queue().servers(),
        &["http://127.0.0.1:6081".to_string(), "http://10.0.0.2".to_string()]
    );
    assert_eq!(client.queue().default_host(), Some("fos.lo"));
    assert_eq!(client.default_ban_headers().get("x-url").unwrap(), "^/static/");
    assert_eq!(client.default_ban_headers().get("x-host").unwrap(), ".*");
}

#[test]
fn test_client_from_config_rejects_bad_server() {
    let file = write_config("servers: [\"https://127.0.0.1\"]\n");
    let config = InvalidatorConfig::from_file(file.path()).unwrap();

    let err = ProxyClient::from_config(&config).err().unwrap();
    assert!(matches!(err, InvalidationError::InvalidUrl { .. }));
}

#[test]
fn test_invalidator_from_config_uses_tags_header() {
    let file = write_config("servers: [127.0.0.1]\ntags_header: X-Tags\n");
    let config = InvalidatorConfig::from_file(file.path()).unwrap();

    let invalidator = CacheInvalidator::from_config(&config).unwrap();
    assert_eq!(invalidator.tags_header().as_str(), "x-tags");
}

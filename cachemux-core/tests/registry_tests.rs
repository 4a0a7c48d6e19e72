// Registry and topology file tests
// Nested composites built from YAML, custom factories and config errors

use cachemux_core::testing::{CacheOp, MockCache, OperationLog};
use cachemux_core::{
    AppConfig, CacheClient, CacheConfig, CacheError, CacheRegistry, Timeout,
};
use std::io::Write;
use std::sync::Arc;

const NESTED: &str = r#"
logging:
  level: warn
  format: pretty
cache:
  type: multilayer
  children:
    - type: memory
      id: local
      timeout: 30
    - type: distribution
      method: hash_mod
      factor: 2
      children:
        0:
          type: replication
          children:
            a: {type: memory, timeout: 0}
            b: {type: memory, timeout: 0}
        1:
          type: replication
          primary: c
          children:
            c: {type: memory, timeout: 0}
            d: {type: memory, timeout: 0}
"#;

fn write_topology(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Registry whose `mock` type hands out recording caches sharing `log`
fn mock_registry(log: &OperationLog) -> CacheRegistry {
    let mut registry = CacheRegistry::with_builtin();
    let log = Arc::clone(log);
    registry.register(
        "mock",
        move |id: &str, _config: &CacheConfig, _registry: &CacheRegistry| {
            Ok(Arc::new(MockCache::with_log(id, Arc::clone(&log))) as Arc<dyn CacheClient>)
        },
    );
    registry
}

#[tokio::test]
async fn test_nested_topology_from_file() {
    let file = write_topology(NESTED);
    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.cache.cache_type, "multilayer");

    let cache = CacheRegistry::with_builtin()
        .create("app", &config.cache)
        .unwrap();

    for i in 0..10 {
        let key = format!("session:{}", i);
        assert!(cache
            .set(&key, i.to_string().into_bytes(), Timeout::Default, false)
            .await
            .unwrap());
    }
    for i in 0..10 {
        let key = format!("session:{}", i);
        assert_eq!(cache.get(&key).await.unwrap(), Some(i.to_string().into_bytes()));
    }

    assert_eq!(cache.incr("counter", 5, false).await.unwrap(), Some(5));
    assert_eq!(cache.get("counter").await.unwrap(), Some(b"5".to_vec()));
}

#[tokio::test]
async fn test_custom_factory_inside_nested_composites() {
    let log = OperationLog::default();
    let registry = mock_registry(&log);

    let config = CacheConfig::from_yaml(
        r#"
type: distribution
method: mod
key_regex: 'user:(\d+)'
factor: 2
children:
  0:
    type: replication
    children:
      r0: {type: mock}
      r1: {type: mock}
  1: {type: mock}
"#,
    )
    .unwrap();
    let cache = registry.create("users", &config).unwrap();

    cache.set("user:4", b"v".to_vec(), Timeout::Never, false).await.unwrap();
    assert_eq!(
        *log.lock(),
        vec![CacheOp::new("r0", "set", "user:4"), CacheOp::new("r1", "set", "user:4")]
    );

    log.lock().clear();
    cache.delete("user:7", false).await.unwrap();
    assert_eq!(*log.lock(), vec![CacheOp::new("1", "delete", "user:7")]);
}

#[test]
fn test_unknown_child_type_fails_whole_topology() {
    let config = CacheConfig::from_yaml(
        r#"
type: replication
children:
  a: {type: memory}
  b: {type: memcached}
"#,
    )
    .unwrap();

    let err = CacheRegistry::with_builtin().create("rep", &config).unwrap_err();
    assert!(matches!(err, CacheError::UnknownCacheType(ref name) if name == "memcached"));
    assert!(err.is_config_error());
}

#[test]
fn test_unknown_replication_primary() {
    let config = CacheConfig::new("replication")
        .with_child("a", CacheConfig::new("memory"))
        .with_option("primary", "z");
    let err = CacheRegistry::with_builtin().create("rep", &config).unwrap_err();
    assert!(err.is_config_error());
}

#[test]
fn test_bad_regex_is_config_error() {
    let config = CacheConfig::new("distribution")
        .with_option("method", "mod")
        .with_option("key_regex", "user:(")
        .with_option("factor", 2)
        .with_child("0", CacheConfig::new("memory"));
    let err = CacheRegistry::with_builtin().create("d", &config).unwrap_err();
    assert!(err.is_config_error());
}

#[test]
fn test_missing_topology_file_is_io_error() {
    let err = AppConfig::from_file("/nonexistent/cachemux.yml").unwrap_err();
    assert!(matches!(err, CacheError::Io(_)));
    assert!(!err.is_config_error());
}

#[test]
fn test_logging_defaults_when_section_missing() {
    let config = AppConfig::from_yaml("cache:\n  type: noop\n").unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "pretty");
}

#[test]
fn test_registered_factory_replaces_builtin() {
    let log = OperationLog::default();
    let mut registry = mock_registry(&log);
    let shared = Arc::clone(&log);
    registry.register(
        "memory",
        move |id: &str, _config: &CacheConfig, _registry: &CacheRegistry| {
            Ok(Arc::new(MockCache::with_log(id, Arc::clone(&shared))) as Arc<dyn CacheClient>)
        },
    );

    assert!(registry.types().contains(&"mock"));
    assert!(registry.create("m", &CacheConfig::new("memory")).is_ok());
}

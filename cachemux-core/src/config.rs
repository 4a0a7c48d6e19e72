use crate::core::{DEFAULT_TIMEOUT_SECS, Result};
use crate::routing::{HashMethod, RoutingMethod};
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::{Mapping, Value as YamlValue};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Configuration record for one cache, adapter or composite.
///
/// Only `type` is interpreted here; the remaining options belong to the
/// factory registered for that type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(rename = "type")]
    pub cache_type: String,
    #[serde(flatten)]
    pub options: Mapping,
}

impl CacheConfig {
    pub fn new(cache_type: impl Into<String>) -> Self {
        Self {
            cache_type: cache_type.into(),
            options: Mapping::new(),
        }
    }

    /// Builder-style option setter
    pub fn with_option(mut self, name: &str, value: impl Into<YamlValue>) -> Self {
        self.options.insert(YamlValue::from(name), value.into());
        self
    }

    /// Builder-style child entry for keyed composites
    pub fn with_child(mut self, id: impl Into<String>, child: CacheConfig) -> Self {
        let children = self
            .options
            .entry(YamlValue::from("children"))
            .or_insert_with(|| YamlValue::Mapping(Mapping::new()));
        match children {
            YamlValue::Mapping(children) => {
                children.insert(YamlValue::from(id.into()), YamlValue::from(child));
            }
            _ => warn!(
                "Cache type '{}': children already hold layers, child '{}' ignored",
                self.cache_type,
                id.into()
            ),
        }
        self
    }

    /// Builder-style layer entry for multilayer composites
    pub fn with_layer(mut self, layer: CacheConfig) -> Self {
        let children = self
            .options
            .entry(YamlValue::from("children"))
            .or_insert_with(|| YamlValue::Sequence(Vec::new()));
        match children {
            YamlValue::Sequence(children) => children.push(YamlValue::from(layer)),
            _ => warn!(
                "Cache type '{}': children already keyed by id, layer ignored",
                self.cache_type
            ),
        }
        self
    }

    /// Single option, `None` when absent
    pub fn option<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.options.get(name) {
            Some(value) => Ok(Some(serde_yaml::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Parse all options into the factory's typed config
    pub fn parse_options<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_yaml::from_value(YamlValue::Mapping(self.options.clone()))?)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Child id -> child config, in configuration order.
///
/// Ids may be written as YAML strings or integers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildTable(pub Vec<(String, CacheConfig)>);

impl ChildTable {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheConfig)> {
        self.0.iter().map(|(id, config)| (id.as_str(), config))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChildKey {
    Int(i64),
    Name(String),
}

impl From<ChildKey> for String {
    fn from(key: ChildKey) -> Self {
        match key {
            ChildKey::Int(id) => id.to_string(),
            ChildKey::Name(name) => name,
        }
    }
}

impl<'de> Deserialize<'de> for ChildTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = ChildTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of child id to cache config")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<ChildTable, A::Error> {
                let mut children = Vec::new();
                while let Some((id, config)) = map.next_entry::<ChildKey, CacheConfig>()? {
                    children.push((String::from(id), config));
                }
                Ok(ChildTable(children))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

impl Serialize for ChildTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, config) in &self.0 {
            map.serialize_entry(id, config)?;
        }
        map.end()
    }
}

/// The YAML form of a config, `type` first and then its options
impl From<CacheConfig> for YamlValue {
    fn from(config: CacheConfig) -> Self {
        let mut mapping = Mapping::new();
        mapping.insert(YamlValue::from("type"), YamlValue::from(config.cache_type));
        mapping.extend(config.options);
        YamlValue::Mapping(mapping)
    }
}

/// Options of `type: distribution`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributionConfig {
    #[serde(default)]
    pub method: RoutingMethod,
    #[serde(default)]
    pub hash_method: HashMethod,
    /// Regex whose first capture group is the numeric sub-key (`mod`/`div`)
    #[serde(default)]
    pub key_regex: Option<String>,
    #[serde(default)]
    pub factor: Option<i64>,
    /// Child config may carry `replica` (virtual nodes, `conhash` only)
    #[serde(default)]
    pub children: ChildTable,
}

/// Options of `type: replication`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Child id serving every read; reads pick a random child when unset
    #[serde(default, deserialize_with = "deserialize_child_id")]
    pub primary: Option<String>,
    #[serde(default)]
    pub children: ChildTable,
}

fn deserialize_child_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<ChildKey>::deserialize(deserializer)?.map(String::from))
}

/// Options of `type: multilayer`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultilayerConfig {
    /// Fastest layer first, primary last
    #[serde(default)]
    pub children: Vec<CacheConfig>,
}

/// Options of `type: memory`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Default expiration in seconds; 0 disables expiration by default
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Seconds between lazy sweeps of expired entries
    #[serde(default = "default_trim_interval")]
    pub trim_interval: u64,
    /// Run a background sweep at this interval when inside a tokio runtime
    #[serde(default)]
    pub ttl_cleanup_interval_ms: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            trim_interval: default_trim_interval(),
            ttl_cleanup_interval_ms: None,
        }
    }
}

/// Options of `type: redis`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Full connection URL; overrides host/port/db/password
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub password: Option<String>,
    /// Prepended to every key
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// COUNT hint for SCAN when clearing a prefix
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: None,
            prefix: String::new(),
            timeout: default_timeout(),
            scan_count: default_scan_count(),
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_trim_interval() -> u64 {
    60
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_scan_count() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_keeps_options() {
        let config = CacheConfig::from_yaml(
            r#"
type: distribution
method: mod
key_regex: 'user:(\d+):.*'
factor: 4
children:
  0: { type: memory }
  1: { type: memory, timeout: 30 }
"#,
        )
        .unwrap();

        assert_eq!(config.cache_type, "distribution");
        assert_eq!(config.option::<i64>("factor").unwrap(), Some(4));
        assert_eq!(config.option::<i64>("missing").unwrap(), None);

        let options: DistributionConfig = config.parse_options().unwrap();
        assert_eq!(options.method, RoutingMethod::Mod);
        assert_eq!(options.key_regex.as_deref(), Some(r"user:(\d+):.*"));
        assert_eq!(options.children.len(), 2);

        let ids: Vec<_> = options.children.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["0", "1"]);
        let (_, second) = &options.children.0[1];
        assert_eq!(second.option::<u64>("timeout").unwrap(), Some(30));
    }

    #[test]
    fn test_child_order_is_configuration_order() {
        let options: ReplicationConfig = CacheConfig::from_yaml(
            r#"
type: replication
primary: zulu
children:
  zulu: { type: memory }
  alpha: { type: memory }
  mike: { type: noop }
"#,
        )
        .unwrap()
        .parse_options()
        .unwrap();

        assert_eq!(options.primary.as_deref(), Some("zulu"));
        let ids: Vec<_> = options.children.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_integer_primary() {
        let options: ReplicationConfig = CacheConfig::new("replication")
            .with_option("primary", 2)
            .parse_options()
            .unwrap();
        assert_eq!(options.primary.as_deref(), Some("2"));
    }

    #[test]
    fn test_builders() {
        let config = CacheConfig::new("multilayer")
            .with_layer(CacheConfig::new("memory"))
            .with_layer(CacheConfig::new("memory").with_option("timeout", 0));
        let options: MultilayerConfig = config.parse_options().unwrap();
        assert_eq!(options.children.len(), 2);

        let config = CacheConfig::new("replication")
            .with_child("a", CacheConfig::new("memory"))
            .with_child("b", CacheConfig::new("noop"));
        let options: ReplicationConfig = config.parse_options().unwrap();
        assert_eq!(options.children.len(), 2);
        assert_eq!(options.children.0[1].1.cache_type, "noop");
    }

    #[test]
    fn test_builders_match_parsed_yaml() {
        let built = CacheConfig::new("replication")
            .with_option("primary", "a")
            .with_child(
                "a",
                CacheConfig::new("redis").with_option("host", "cache-1"),
            )
            .with_child("b", CacheConfig::new("noop"));
        let parsed = CacheConfig::from_yaml(
            r#"
type: replication
primary: a
children:
  a: { type: redis, host: cache-1 }
  b: { type: noop }
"#,
        )
        .unwrap();
        assert_eq!(built, parsed);

        let nested = CacheConfig::new("multilayer").with_layer(built.clone());
        let options: MultilayerConfig = nested.parse_options().unwrap();
        assert_eq!(options.children, vec![built]);
    }

    #[test]
    fn test_mixed_children_keep_first_shape() {
        let config = CacheConfig::new("multilayer")
            .with_layer(CacheConfig::new("memory"))
            .with_child("x", CacheConfig::new("noop"));
        let options: MultilayerConfig = config.parse_options().unwrap();
        assert_eq!(options.children.len(), 1);
    }

    #[test]
    fn test_memory_defaults() {
        let options: MemoryConfig = CacheConfig::new("memory").parse_options().unwrap();
        assert_eq!(options.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(options.trim_interval, 60);
        assert_eq!(options.ttl_cleanup_interval_ms, None);
    }

    #[test]
    fn test_redis_connection_url() {
        let config = RedisConfig::default();
        assert_eq!(config.connection_url(), "redis://127.0.0.1:6379/0");

        let config = RedisConfig {
            password: Some("secret".to_string()),
            db: 2,
            ..Default::default()
        };
        assert_eq!(config.connection_url(), "redis://:secret@127.0.0.1:6379/2");
    }

    #[test]
    fn test_app_config() {
        let config = AppConfig::from_yaml(
            r#"
logging:
  level: debug
  format: json
cache:
  type: memory
"#,
        )
        .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.cache.cache_type, "memory");

        let config = AppConfig::from_yaml("cache: { type: noop }").unwrap();
        assert_eq!(config.logging.format, "pretty");
    }
}

//! Cache construction by type name
//!
//! A [`CacheRegistry`] maps the `type` of a [`CacheConfig`] to a factory.
//! Composite factories receive the registry that is building them and use it
//! for their children, so a nested topology resolves every level against the
//! same set of constructors. There is no global registry; callers own theirs.
//!
//! ```no_run
//! use cachemux_core::{CacheConfig, CacheRegistry};
//!
//! # fn example() -> cachemux_core::Result<()> {
//! let config = CacheConfig::from_yaml(
//!     r#"
//! type: multilayer
//! children:
//!   - type: memory
//!     timeout: 5
//!   - type: memory
//!     timeout: 0
//! "#,
//! )?;
//! let cache = CacheRegistry::with_builtin().create("sessions", &config)?;
//! # Ok(())
//! # }
//! ```

use crate::adapters::{MemoryCache, NoopCache};
use crate::composite::{DistributionCache, MultilayerCache, ReplicationCache};
use crate::config::{CacheConfig, MemoryConfig};
use crate::core::{CacheClient, CacheError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Builds one cache from its configuration
pub trait CacheFactory: Send + Sync {
    /// `registry` is the registry running this factory, for building children
    fn create(
        &self,
        id: &str,
        config: &CacheConfig,
        registry: &CacheRegistry,
    ) -> Result<Arc<dyn CacheClient>>;
}

impl<F> CacheFactory for F
where
    F: Fn(&str, &CacheConfig, &CacheRegistry) -> Result<Arc<dyn CacheClient>> + Send + Sync,
{
    fn create(
        &self,
        id: &str,
        config: &CacheConfig,
        registry: &CacheRegistry,
    ) -> Result<Arc<dyn CacheClient>> {
        self(id, config, registry)
    }
}

/// Type name -> factory
#[derive(Clone, Default)]
pub struct CacheRegistry {
    factories: HashMap<String, Arc<dyn CacheFactory>>,
}

impl CacheRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every cache type bundled in this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("memory", build_memory)
            .register("noop", build_noop)
            .register("distribution", build_distribution)
            .register("replication", build_replication)
            .register("multilayer", build_multilayer);

        #[cfg(feature = "redis")]
        registry.register("redis", build_redis);

        registry
    }

    /// Add or replace the factory for `cache_type`
    pub fn register(
        &mut self,
        cache_type: impl Into<String>,
        factory: impl CacheFactory + 'static,
    ) -> &mut Self {
        self.factories.insert(cache_type.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, cache_type: &str) -> bool {
        self.factories.contains_key(cache_type)
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Build the cache described by `config` under the name `id`
    pub fn create(&self, id: &str, config: &CacheConfig) -> Result<Arc<dyn CacheClient>> {
        let factory = self
            .factories
            .get(&config.cache_type)
            .ok_or_else(|| CacheError::UnknownCacheType(config.cache_type.clone()))?;

        debug!("Creating cache '{}' of type '{}'", id, config.cache_type);
        factory.create(id, config, self)
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("types", &self.types())
            .finish()
    }
}

fn build_memory(
    id: &str,
    config: &CacheConfig,
    _registry: &CacheRegistry,
) -> Result<Arc<dyn CacheClient>> {
    let options: MemoryConfig = config.parse_options()?;
    let cleanup = options.ttl_cleanup_interval_ms;
    let cache = MemoryCache::new(options);

    match cleanup {
        Some(0) => {
            return Err(CacheError::invalid_config(
                id,
                "ttl_cleanup_interval_ms must be positive",
            ));
        }
        Some(ms) => {
            if tokio::runtime::Handle::try_current().is_ok() {
                cache.start_ttl_cleanup(Duration::from_millis(ms));
            } else {
                warn!(
                    "Cache '{}': no tokio runtime, background TTL cleanup not started",
                    id
                );
            }
        }
        None => {}
    }

    Ok(Arc::new(cache))
}

fn build_noop(
    _id: &str,
    _config: &CacheConfig,
    _registry: &CacheRegistry,
) -> Result<Arc<dyn CacheClient>> {
    Ok(Arc::new(NoopCache::new()))
}

fn build_distribution(
    id: &str,
    config: &CacheConfig,
    registry: &CacheRegistry,
) -> Result<Arc<dyn CacheClient>> {
    Ok(Arc::new(DistributionCache::from_config(id, config, registry)?))
}

fn build_replication(
    id: &str,
    config: &CacheConfig,
    registry: &CacheRegistry,
) -> Result<Arc<dyn CacheClient>> {
    Ok(Arc::new(ReplicationCache::from_config(id, config, registry)?))
}

fn build_multilayer(
    id: &str,
    config: &CacheConfig,
    registry: &CacheRegistry,
) -> Result<Arc<dyn CacheClient>> {
    Ok(Arc::new(MultilayerCache::from_config(id, config, registry)?))
}

#[cfg(feature = "redis")]
fn build_redis(
    _id: &str,
    config: &CacheConfig,
    _registry: &CacheRegistry,
) -> Result<Arc<dyn CacheClient>> {
    let options: crate::config::RedisConfig = config.parse_options()?;
    Ok(Arc::new(crate::adapters::RedisCache::new(&options)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::NoopCache;
    use crate::core::Timeout;

    #[test]
    fn test_builtin_types() {
        let registry = CacheRegistry::with_builtin();
        for cache_type in ["memory", "noop", "distribution", "replication", "multilayer"] {
            assert!(registry.contains(cache_type), "missing {}", cache_type);
        }
        assert!(CacheRegistry::new().types().is_empty());
    }

    #[test]
    fn test_unknown_type() {
        let registry = CacheRegistry::with_builtin();
        let err = registry
            .create("x", &CacheConfig::new("memcached"))
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownCacheType(name) if name == "memcached"));
    }

    #[tokio::test]
    async fn test_custom_factory_is_used_for_children() {
        let mut registry = CacheRegistry::with_builtin();
        registry.register(
            "blackhole",
            |_id: &str, _config: &CacheConfig, _registry: &CacheRegistry| {
                Ok(Arc::new(NoopCache::new()) as Arc<dyn CacheClient>)
            },
        );

        let config = CacheConfig::new("replication")
            .with_child("a", CacheConfig::new("memory"))
            .with_child("b", CacheConfig::new("blackhole"));
        let cache = registry.create("rep", &config).unwrap();

        assert!(cache.set("k", b"v".to_vec(), Timeout::Never, false).await.unwrap());
    }

    #[test]
    fn test_empty_composite_is_config_error() {
        let registry = CacheRegistry::with_builtin();
        for cache_type in ["distribution", "replication", "multilayer"] {
            let err = registry
                .create("empty", &CacheConfig::new(cache_type))
                .unwrap_err();
            assert!(err.is_config_error(), "{}: {}", cache_type, err);
        }
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let config = CacheConfig::new("memory").with_option("ttl_cleanup_interval_ms", 0);
        let err = CacheRegistry::with_builtin()
            .create("m", &config)
            .unwrap_err();
        assert!(err.is_config_error());
    }
}

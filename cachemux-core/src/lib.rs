//! Uniform cache access with sharding, replication and tiering.
//!
//! Every backend and every composite implements [`CacheClient`]. Topologies
//! are described with [`CacheConfig`] and built by a [`CacheRegistry`].

pub mod adapters;
pub mod composite;
pub mod config;
pub mod core;
pub mod registry;
pub mod routing;
pub mod testing;

// Re-export commonly used types
pub use adapters::{MemoryCache, NoopCache};
#[cfg(feature = "redis")]
pub use adapters::RedisCache;
pub use composite::{ChildCache, DistributionCache, MultilayerCache, ReplicationCache};
pub use config::{AppConfig, CacheConfig, LoggingConfig};
pub use core::{
    Aggregate, CacheClient, CacheError, DEFAULT_TIMEOUT_SECS, Result, ScoredMember, Timeout, Value,
};
pub use registry::{CacheFactory, CacheRegistry};
pub use routing::{HashMethod, HashRing, RoutingMethod, RoutingStrategy, ShardId};

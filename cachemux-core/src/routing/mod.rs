//! Key routing for distribution caches

pub mod hash;
pub mod ring;
pub mod strategy;

pub use hash::{HashMethod, crc32};
pub use ring::{DEFAULT_REPLICAS, HashRing};
pub use strategy::{RoutingMethod, RoutingStrategy, ShardId};

//! Bundled backend adapters

pub mod memory;
pub mod noop;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryCache;
pub use noop::NoopCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;

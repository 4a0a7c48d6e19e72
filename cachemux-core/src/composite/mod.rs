//! Composite caches
//!
//! Each composite holds named children behind [`CacheClient`](crate::CacheClient)
//! and is itself a `CacheClient`, so topologies nest: a distribution of
//! replicated pairs, a multilayer whose primary is a distribution, and so on.
//! Calls to children are issued one at a time, in configuration order.

pub mod distribution;
mod merge;
pub mod multilayer;
pub mod replication;

pub use distribution::DistributionCache;
pub use merge::ChildCache;
pub use multilayer::MultilayerCache;
pub use replication::ReplicationCache;

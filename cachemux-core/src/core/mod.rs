pub mod client;
pub mod error;
pub mod types;

pub use client::CacheClient;
pub use error::{CacheError, Result};
pub use types::{Aggregate, DEFAULT_TIMEOUT_SECS, ScoredMember, Timeout, Value};

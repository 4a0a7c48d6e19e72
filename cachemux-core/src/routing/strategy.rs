//! Key -> shard routing strategies
//!
//! The strategy is picked once when a distribution cache is built; routing a
//! key is then a pure function of the key.
//!
//! | method     | shard id                                  |
//! |------------|-------------------------------------------|
//! | `conhash`  | owner on the consistent hash ring         |
//! | `mod`      | `regex_capture(key) % factor`             |
//! | `div`      | `regex_capture(key) / factor`             |
//! | `hash_mod` | `crc32(key) % factor`                     |
//! | `hash_div` | `crc32(key) / factor`                     |

use super::hash::crc32;
use super::ring::HashRing;
use crate::core::{CacheError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing method as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    #[default]
    #[serde(rename = "conhash")]
    ConHash,
    Mod,
    Div,
    HashMod,
    HashDiv,
}

impl RoutingMethod {
    /// Whether shards are identified by integer buckets rather than names
    pub fn is_bucketed(self) -> bool {
        !matches!(self, Self::ConHash)
    }

    /// Whether a `key_regex` is needed to extract the numeric sub-key
    pub fn needs_regex(self) -> bool {
        matches!(self, Self::Mod | Self::Div)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConHash => "conhash",
            Self::Mod => "mod",
            Self::Div => "div",
            Self::HashMod => "hash_mod",
            Self::HashDiv => "hash_div",
        }
    }
}

impl fmt::Display for RoutingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a child inside a distribution cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShardId {
    /// Child name on the consistent hash ring
    Name(String),
    /// Integer bucket for the modular strategies
    Bucket(i64),
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Bucket(bucket) => write!(f, "{}", bucket),
        }
    }
}

/// A routing strategy with everything it needs, fixed at construction
#[derive(Debug, Clone)]
pub enum RoutingStrategy {
    ConHash(HashRing),
    Mod { pattern: Regex, factor: i64 },
    Div { pattern: Regex, factor: i64 },
    HashMod { factor: i64 },
    HashDiv { factor: i64 },
}

impl RoutingStrategy {
    /// Build one of the modular strategies.
    ///
    /// `key_regex` is matched from the start of the key and its first
    /// capture group is the numeric sub-key.
    pub fn modular(
        id: &str,
        method: RoutingMethod,
        key_regex: Option<&str>,
        factor: Option<i64>,
    ) -> Result<Self> {
        let factor = match factor {
            Some(factor) if factor > 0 => factor,
            Some(factor) => {
                return Err(CacheError::invalid_config(
                    id,
                    format!("factor must be positive, got {}", factor),
                ));
            }
            None => {
                return Err(CacheError::invalid_config(
                    id,
                    format!("method '{}' requires factor", method),
                ));
            }
        };

        let pattern = if method.needs_regex() {
            let key_regex = key_regex.ok_or_else(|| {
                CacheError::invalid_config(id, format!("method '{}' requires key_regex", method))
            })?;
            let pattern = Regex::new(&format!("^(?:{})", key_regex))?;
            if pattern.captures_len() < 2 {
                return Err(CacheError::invalid_config(
                    id,
                    format!("key_regex '{}' has no capture group", key_regex),
                ));
            }
            Some(pattern)
        } else {
            None
        };

        match (method, pattern) {
            (RoutingMethod::Mod, Some(pattern)) => Ok(Self::Mod { pattern, factor }),
            (RoutingMethod::Div, Some(pattern)) => Ok(Self::Div { pattern, factor }),
            (RoutingMethod::HashMod, _) => Ok(Self::HashMod { factor }),
            (RoutingMethod::HashDiv, _) => Ok(Self::HashDiv { factor }),
            (method, _) => Err(CacheError::invalid_config(
                id,
                format!("method '{}' is not a modular strategy", method),
            )),
        }
    }

    /// Method this strategy implements
    pub fn method(&self) -> RoutingMethod {
        match self {
            Self::ConHash(_) => RoutingMethod::ConHash,
            Self::Mod { .. } => RoutingMethod::Mod,
            Self::Div { .. } => RoutingMethod::Div,
            Self::HashMod { .. } => RoutingMethod::HashMod,
            Self::HashDiv { .. } => RoutingMethod::HashDiv,
        }
    }

    /// Shard owning `key`, or `None` when the key cannot be routed
    pub fn route(&self, key: &str) -> Option<ShardId> {
        match self {
            Self::ConHash(ring) => ring.lookup(key).map(|name| ShardId::Name(name.to_string())),
            Self::Mod { pattern, factor } => {
                extract_sub_key(pattern, key).map(|sub| ShardId::Bucket(sub.rem_euclid(*factor)))
            }
            Self::Div { pattern, factor } => {
                extract_sub_key(pattern, key).map(|sub| ShardId::Bucket(sub.div_euclid(*factor)))
            }
            Self::HashMod { factor } => Some(ShardId::Bucket(key_hash(key) % factor)),
            Self::HashDiv { factor } => Some(ShardId::Bucket(key_hash(key) / factor)),
        }
    }
}

/// First capture group of `pattern` in `key`, parsed as an integer
fn extract_sub_key(pattern: &Regex, key: &str) -> Option<i64> {
    let captures = pattern.captures(key)?;
    captures.get(1)?.as_str().trim().parse().ok()
}

fn key_hash(key: &str) -> i64 {
    i64::from(crc32(key.as_bytes()))
}

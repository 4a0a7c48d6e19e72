//! The cache operation contract
//!
//! Every backend adapter and every composite implements [`CacheClient`], so a
//! composite's children can themselves be composites.
//!
//! # Return values
//!
//! `Err` means the backend raised. Operations that have a natural failure
//! value (`false`, `None`, `0`, an empty collection) use it for conditions the
//! caller is expected to handle routinely, such as a missing key or a key that
//! no shard owns.

use super::error::Result;
use super::types::{Aggregate, ScoredMember, Timeout, Value};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Key/value, list, hash, set and sorted-set operations against one logical cache
#[async_trait]
pub trait CacheClient: Send + Sync {
    // ==================== Scalar ====================

    /// Look up `key`; `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Values for `keys`, in the same order, `None` for missing keys
    async fn get_values(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        let found = self.get_key_to_value(keys).await?;
        Ok(keys.iter().map(|key| found.get(*key).cloned()).collect())
    }

    /// Like [`CacheClient::get_values`] but keyed; missing keys are omitted
    async fn get_key_to_value(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    /// Store `value` under `key`, overwriting any existing value
    async fn set(&self, key: &str, value: Value, timeout: Timeout, noreply: bool) -> Result<bool>;

    /// Store `value` only if `key` holds no live value
    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool>;

    /// Store several pairs; true only if every pair was stored
    async fn set_many(
        &self,
        pairs: Vec<(String, Value)>,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        let mut stored = true;
        for (key, value) in pairs {
            if !self.set(&key, value, timeout, noreply).await? {
                stored = false;
            }
        }
        Ok(stored)
    }

    /// Remove `key`
    async fn delete(&self, key: &str, noreply: bool) -> Result<bool>;

    /// Remove several keys; true only if every delete succeeded
    async fn delete_many(&self, keys: &[&str], noreply: bool) -> Result<bool> {
        let mut deleted = true;
        for key in keys {
            if !self.delete(key, noreply).await? {
                deleted = false;
            }
        }
        Ok(deleted)
    }

    /// Add `delta` to the integer at `key` (missing keys start at 0).
    /// `None` signals a backend failure.
    async fn incr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>>;

    /// Subtract `delta` from the integer at `key`
    async fn decr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>> {
        match delta.checked_neg() {
            Some(negated) => self.incr(key, negated, noreply).await,
            None => Ok(None),
        }
    }

    /// Drop everything this cache holds
    async fn clear(&self) -> Result<bool>;

    /// Reset the expiration of `key`; false if the key does not exist
    async fn expire(&self, key: &str, timeout: Timeout) -> Result<bool>;

    // ==================== List ====================

    /// Pop from the head, waiting up to `timeout` seconds (0 waits forever)
    async fn block_left_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>>;

    /// Pop from the tail, waiting up to `timeout` seconds (0 waits forever)
    async fn block_right_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>>;

    /// Element at `index`; negative indices count from the tail
    async fn lindex(&self, key: &str, index: i64) -> Result<Option<Value>>;

    async fn llen(&self, key: &str) -> Result<usize>;

    async fn lpop(&self, key: &str) -> Result<Option<Value>>;

    async fn lpush(&self, key: &str, value: Value) -> Result<bool>;

    /// Elements between `start` and `end`, both inclusive
    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<Value>>;

    /// Keep only the elements between `start` and `end`, both inclusive
    async fn ltrim(&self, key: &str, start: i64, end: i64) -> Result<bool>;

    async fn rpop(&self, key: &str) -> Result<Option<Value>>;

    async fn rpush(&self, key: &str, value: Value) -> Result<bool>;

    // ==================== Hash ====================

    /// All fields of the hash; empty if the key does not exist
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Value>>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Value>>;

    /// Set one field. `timeout` applies to the whole hash.
    async fn hset(
        &self,
        key: &str,
        field: &str,
        value: Value,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool>;

    async fn hdel(&self, key: &str, field: &str, noreply: bool) -> Result<bool>;

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self.hget(key, field).await?.is_some())
    }

    async fn hlen(&self, key: &str) -> Result<usize> {
        Ok(self.hgetall(key).await?.len())
    }

    // ==================== Set ====================

    async fn sadd(&self, key: &str, value: Value) -> Result<bool>;

    async fn sadd_many(&self, key: &str, values: Vec<Value>) -> Result<bool>;

    async fn scard(&self, key: &str) -> Result<usize>;

    async fn sismember(&self, key: &str, value: &[u8]) -> Result<bool>;

    async fn smembers(&self, key: &str) -> Result<HashSet<Value>>;

    async fn srandmember(&self, key: &str) -> Result<Option<Value>>;

    async fn srem(&self, key: &str, value: &[u8]) -> Result<bool>;

    // ==================== Sorted set ====================

    async fn zadd(&self, key: &str, member: Value, score: f64) -> Result<bool>;

    async fn zcard(&self, key: &str) -> Result<usize>;

    /// Members with `min <= score <= max`
    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<usize>;

    /// Add `delta` to the member's score; `None` signals a backend failure
    async fn zincrby(&self, key: &str, member: Value, delta: f64) -> Result<Option<f64>>;

    /// Members by rank between `start` and `end` (inclusive), lowest score first
    /// unless `reverse`
    async fn zrange(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>>;

    /// Members with `min <= score <= max`, optionally paged with `offset`/`count`
    async fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: Option<usize>,
        count: Option<usize>,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>>;

    async fn zrank(&self, key: &str, member: &[u8], reverse: bool) -> Result<Option<usize>>;

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool>;

    /// Remove members by rank range; returns how many were removed
    async fn zremrangebyrank(&self, key: &str, start: i64, end: i64, reverse: bool)
    -> Result<usize>;

    /// Remove members with `min <= score <= max`; returns how many were removed
    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize>;

    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>>;

    /// Store the union of `keys` at `dest`; returns the size of `dest`
    async fn zunionstore(&self, dest: &str, keys: &[&str], aggregate: Aggregate) -> Result<usize>;
}

impl std::fmt::Debug for dyn CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient").finish_non_exhaustive()
    }
}

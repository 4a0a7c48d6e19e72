//! Cache that stores nothing
//!
//! Writes report success, reads miss, counters behave as if every key were
//! missing. Useful to switch a layer or replica off by configuration.

use crate::core::{Aggregate, CacheClient, Result, ScoredMember, Timeout, Value};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl NoopCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheClient for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: Value,
        _timeout: Timeout,
        _noreply: bool,
    ) -> Result<bool> {
        Ok(true)
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: Value,
        _timeout: Timeout,
        _noreply: bool,
    ) -> Result<bool> {
        Ok(true)
    }

    async fn delete(&self, _key: &str, _noreply: bool) -> Result<bool> {
        Ok(true)
    }

    async fn incr(&self, _key: &str, delta: i64, _noreply: bool) -> Result<Option<i64>> {
        Ok(Some(delta))
    }

    async fn clear(&self) -> Result<bool> {
        Ok(true)
    }

    async fn expire(&self, _key: &str, _timeout: Timeout) -> Result<bool> {
        Ok(false)
    }

    /// Returns immediately; nothing will ever be pushed
    async fn block_left_pop(&self, _key: &str, _timeout: u64) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn block_right_pop(&self, _key: &str, _timeout: u64) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn lindex(&self, _key: &str, _index: i64) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn llen(&self, _key: &str) -> Result<usize> {
        Ok(0)
    }

    async fn lpop(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn lpush(&self, _key: &str, _value: Value) -> Result<bool> {
        Ok(true)
    }

    async fn lrange(&self, _key: &str, _start: i64, _end: i64) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn ltrim(&self, _key: &str, _start: i64, _end: i64) -> Result<bool> {
        Ok(true)
    }

    async fn rpop(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn rpush(&self, _key: &str, _value: Value) -> Result<bool> {
        Ok(true)
    }

    async fn hgetall(&self, _key: &str) -> Result<HashMap<String, Value>> {
        Ok(HashMap::new())
    }

    async fn hget(&self, _key: &str, _field: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn hset(
        &self,
        _key: &str,
        _field: &str,
        _value: Value,
        _timeout: Timeout,
        _noreply: bool,
    ) -> Result<bool> {
        Ok(true)
    }

    async fn hdel(&self, _key: &str, _field: &str, _noreply: bool) -> Result<bool> {
        Ok(true)
    }

    async fn sadd(&self, _key: &str, _value: Value) -> Result<bool> {
        Ok(true)
    }

    async fn sadd_many(&self, _key: &str, _values: Vec<Value>) -> Result<bool> {
        Ok(true)
    }

    async fn scard(&self, _key: &str) -> Result<usize> {
        Ok(0)
    }

    async fn sismember(&self, _key: &str, _value: &[u8]) -> Result<bool> {
        Ok(false)
    }

    async fn smembers(&self, _key: &str) -> Result<HashSet<Value>> {
        Ok(HashSet::new())
    }

    async fn srandmember(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn srem(&self, _key: &str, _value: &[u8]) -> Result<bool> {
        Ok(true)
    }

    async fn zadd(&self, _key: &str, _member: Value, _score: f64) -> Result<bool> {
        Ok(true)
    }

    async fn zcard(&self, _key: &str) -> Result<usize> {
        Ok(0)
    }

    async fn zcount(&self, _key: &str, _min: f64, _max: f64) -> Result<usize> {
        Ok(0)
    }

    async fn zincrby(&self, _key: &str, _member: Value, delta: f64) -> Result<Option<f64>> {
        Ok(Some(delta))
    }

    async fn zrange(
        &self,
        _key: &str,
        _start: i64,
        _end: i64,
        _reverse: bool,
    ) -> Result<Vec<ScoredMember>> {
        Ok(Vec::new())
    }

    async fn zrangebyscore(
        &self,
        _key: &str,
        _min: f64,
        _max: f64,
        _offset: Option<usize>,
        _count: Option<usize>,
        _reverse: bool,
    ) -> Result<Vec<ScoredMember>> {
        Ok(Vec::new())
    }

    async fn zrank(&self, _key: &str, _member: &[u8], _reverse: bool) -> Result<Option<usize>> {
        Ok(None)
    }

    async fn zrem(&self, _key: &str, _member: &[u8]) -> Result<bool> {
        Ok(true)
    }

    async fn zremrangebyrank(
        &self,
        _key: &str,
        _start: i64,
        _end: i64,
        _reverse: bool,
    ) -> Result<usize> {
        Ok(0)
    }

    async fn zremrangebyscore(&self, _key: &str, _min: f64, _max: f64) -> Result<usize> {
        Ok(0)
    }

    async fn zscore(&self, _key: &str, _member: &[u8]) -> Result<Option<f64>> {
        Ok(None)
    }

    async fn zunionstore(
        &self,
        _dest: &str,
        _keys: &[&str],
        _aggregate: Aggregate,
    ) -> Result<usize> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_succeed_reads_miss() {
        let cache = NoopCache::new();
        assert!(cache.set("k", b"v".to_vec(), Timeout::Default, false).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.get_values(&["k", "j"]).await.unwrap(), vec![None, None]);
        assert_eq!(cache.incr("n", 3, false).await.unwrap(), Some(3));
        assert_eq!(cache.block_left_pop("l", 0).await.unwrap(), None);
        assert!(!cache.hexists("h", "f").await.unwrap());
    }
}

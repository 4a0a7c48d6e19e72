//! Recording cache for tests
//!
//! [`MockCache`] stores data in a [`MemoryCache`], records every operation it
//! receives and can be told to fail operations on demand. Several mocks can
//! share one operation log so a test can observe the order in which a
//! composite touches its children.

use crate::adapters::MemoryCache;
use crate::core::{Aggregate, CacheClient, CacheError, Result, ScoredMember, Timeout, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOp {
    /// Id of the mock that received the call
    pub cache: String,
    /// Operation name, e.g. `"set"` or `"zadd"`
    pub op: &'static str,
    /// Target key; multi-key operations join their keys with `,`
    pub key: String,
}

impl CacheOp {
    pub fn new(cache: &str, op: &'static str, key: &str) -> Self {
        Self {
            cache: cache.to_string(),
            op,
            key: key.to_string(),
        }
    }
}

/// Operation log shared between mocks
pub type OperationLog = Arc<Mutex<Vec<CacheOp>>>;

type FailPredicate = Box<dyn Fn(&CacheOp) -> bool + Send + Sync>;

/// A memory-backed cache that records calls and injects failures.
///
/// ```no_run
/// use cachemux_core::testing::MockCache;
/// use cachemux_core::{CacheClient, Timeout};
///
/// # async fn example() {
/// let cache = MockCache::new("a");
/// cache.fail_when(|op| op.op == "set" && op.key == "forbidden");
///
/// assert!(cache.set("forbidden", b"v".to_vec(), Timeout::Default, false).await.is_err());
/// assert!(cache.set("allowed", b"v".to_vec(), Timeout::Default, false).await.unwrap());
/// assert_eq!(cache.operations().len(), 2);
/// # }
/// ```
pub struct MockCache {
    id: String,
    inner: MemoryCache,
    operations: OperationLog,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl std::fmt::Debug for MockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCache")
            .field("id", &self.id)
            .field("operations", &self.operations.lock().len())
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl Clone for MockCache {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            inner: self.inner.clone(),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl Default for MockCache {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl MockCache {
    /// A mock with its own operation log
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_log(id, OperationLog::default())
    }

    /// A mock that appends to `log`
    #[must_use]
    pub fn with_log(id: impl Into<String>, log: OperationLog) -> Self {
        Self {
            id: id.into(),
            inner: MemoryCache::default(),
            operations: log,
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The backing store, for seeding or inspecting data without recording
    pub fn inner(&self) -> &MemoryCache {
        &self.inner
    }

    /// Fail every operation for which `predicate` returns true with
    /// [`CacheError::Backend`]. Failed operations are still recorded.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&CacheOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Operations this mock received, oldest first
    #[must_use]
    pub fn operations(&self) -> Vec<CacheOp> {
        self.operations
            .lock()
            .iter()
            .filter(|op| op.cache == self.id)
            .cloned()
            .collect()
    }

    /// Every entry of the shared log, whichever mock recorded it
    #[must_use]
    pub fn log(&self) -> Vec<CacheOp> {
        self.operations.lock().clone()
    }

    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn enter(&self, op: &'static str, key: &str) -> Result<()> {
        let op = CacheOp::new(&self.id, op, key);
        let fail = self
            .fail_when
            .lock()
            .as_ref()
            .is_some_and(|predicate| predicate(&op));
        let message = fail.then(|| format!("mock {}: {} '{}' failed", op.cache, op.op, op.key));
        self.operations.lock().push(op);
        match message {
            Some(message) => Err(CacheError::Backend(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CacheClient for MockCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.enter("get", key)?;
        self.inner.get(key).await
    }

    async fn get_values(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        self.enter("get_values", &keys.join(","))?;
        self.inner.get_values(keys).await
    }

    async fn get_key_to_value(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        self.enter("get_key_to_value", &keys.join(","))?;
        self.inner.get_key_to_value(keys).await
    }

    async fn set(&self, key: &str, value: Value, timeout: Timeout, noreply: bool) -> Result<bool> {
        self.enter("set", key)?;
        self.inner.set(key, value, timeout, noreply).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        self.enter("set_if_absent", key)?;
        self.inner.set_if_absent(key, value, timeout, noreply).await
    }

    async fn set_many(
        &self,
        pairs: Vec<(String, Value)>,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        let keys: Vec<&str> = pairs.iter().map(|(key, _)| key.as_str()).collect();
        self.enter("set_many", &keys.join(","))?;
        self.inner.set_many(pairs, timeout, noreply).await
    }

    async fn delete(&self, key: &str, noreply: bool) -> Result<bool> {
        self.enter("delete", key)?;
        self.inner.delete(key, noreply).await
    }

    async fn delete_many(&self, keys: &[&str], noreply: bool) -> Result<bool> {
        self.enter("delete_many", &keys.join(","))?;
        self.inner.delete_many(keys, noreply).await
    }

    async fn incr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>> {
        self.enter("incr", key)?;
        self.inner.incr(key, delta, noreply).await
    }

    async fn decr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>> {
        self.enter("decr", key)?;
        self.inner.decr(key, delta, noreply).await
    }

    async fn clear(&self) -> Result<bool> {
        self.enter("clear", "")?;
        self.inner.clear().await
    }

    async fn expire(&self, key: &str, timeout: Timeout) -> Result<bool> {
        self.enter("expire", key)?;
        self.inner.expire(key, timeout).await
    }

    async fn block_left_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.enter("block_left_pop", key)?;
        self.inner.block_left_pop(key, timeout).await
    }

    async fn block_right_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.enter("block_right_pop", key)?;
        self.inner.block_right_pop(key, timeout).await
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<Value>> {
        self.enter("lindex", key)?;
        self.inner.lindex(key, index).await
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        self.enter("llen", key)?;
        self.inner.llen(key).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<Value>> {
        self.enter("lpop", key)?;
        self.inner.lpop(key).await
    }

    async fn lpush(&self, key: &str, value: Value) -> Result<bool> {
        self.enter("lpush", key)?;
        self.inner.lpush(key, value).await
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<Value>> {
        self.enter("lrange", key)?;
        self.inner.lrange(key, start, end).await
    }

    async fn ltrim(&self, key: &str, start: i64, end: i64) -> Result<bool> {
        self.enter("ltrim", key)?;
        self.inner.ltrim(key, start, end).await
    }

    async fn rpop(&self, key: &str) -> Result<Option<Value>> {
        self.enter("rpop", key)?;
        self.inner.rpop(key).await
    }

    async fn rpush(&self, key: &str, value: Value) -> Result<bool> {
        self.enter("rpush", key)?;
        self.inner.rpush(key, value).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Value>> {
        self.enter("hgetall", key)?;
        self.inner.hgetall(key).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Value>> {
        self.enter("hget", key)?;
        self.inner.hget(key, field).await
    }

    async fn hset(
        &self,
        key: &str,
        field: &str,
        value: Value,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        self.enter("hset", key)?;
        self.inner.hset(key, field, value, timeout, noreply).await
    }

    async fn hdel(&self, key: &str, field: &str, noreply: bool) -> Result<bool> {
        self.enter("hdel", key)?;
        self.inner.hdel(key, field, noreply).await
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.enter("hexists", key)?;
        self.inner.hexists(key, field).await
    }

    async fn hlen(&self, key: &str) -> Result<usize> {
        self.enter("hlen", key)?;
        self.inner.hlen(key).await
    }

    async fn sadd(&self, key: &str, value: Value) -> Result<bool> {
        self.enter("sadd", key)?;
        self.inner.sadd(key, value).await
    }

    async fn sadd_many(&self, key: &str, values: Vec<Value>) -> Result<bool> {
        self.enter("sadd_many", key)?;
        self.inner.sadd_many(key, values).await
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        self.enter("scard", key)?;
        self.inner.scard(key).await
    }

    async fn sismember(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.enter("sismember", key)?;
        self.inner.sismember(key, value).await
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<Value>> {
        self.enter("smembers", key)?;
        self.inner.smembers(key).await
    }

    async fn srandmember(&self, key: &str) -> Result<Option<Value>> {
        self.enter("srandmember", key)?;
        self.inner.srandmember(key).await
    }

    async fn srem(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.enter("srem", key)?;
        self.inner.srem(key, value).await
    }

    async fn zadd(&self, key: &str, member: Value, score: f64) -> Result<bool> {
        self.enter("zadd", key)?;
        self.inner.zadd(key, member, score).await
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        self.enter("zcard", key)?;
        self.inner.zcard(key).await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.enter("zcount", key)?;
        self.inner.zcount(key, min, max).await
    }

    async fn zincrby(&self, key: &str, member: Value, delta: f64) -> Result<Option<f64>> {
        self.enter("zincrby", key)?;
        self.inner.zincrby(key, member, delta).await
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>> {
        self.enter("zrange", key)?;
        self.inner.zrange(key, start, end, reverse).await
    }

    async fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: Option<usize>,
        count: Option<usize>,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>> {
        self.enter("zrangebyscore", key)?;
        self.inner
            .zrangebyscore(key, min, max, offset, count, reverse)
            .await
    }

    async fn zrank(&self, key: &str, member: &[u8], reverse: bool) -> Result<Option<usize>> {
        self.enter("zrank", key)?;
        self.inner.zrank(key, member, reverse).await
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool> {
        self.enter("zrem", key)?;
        self.inner.zrem(key, member).await
    }

    async fn zremrangebyrank(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<usize> {
        self.enter("zremrangebyrank", key)?;
        self.inner.zremrangebyrank(key, start, end, reverse).await
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.enter("zremrangebyscore", key)?;
        self.inner.zremrangebyscore(key, min, max).await
    }

    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>> {
        self.enter("zscore", key)?;
        self.inner.zscore(key, member).await
    }

    async fn zunionstore(&self, dest: &str, keys: &[&str], aggregate: Aggregate) -> Result<usize> {
        self.enter("zunionstore", dest)?;
        self.inner.zunionstore(dest, keys, aggregate).await
    }
}

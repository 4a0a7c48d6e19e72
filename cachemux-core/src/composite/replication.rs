//! Full replication across children
//!
//! Writes go to every child in configuration order; the result is true only
//! if every child succeeded. There is no rollback: a child that accepted a
//! write keeps it even when a sibling rejected it. Counters are the one
//! exception, a failed increment removes the key everywhere so replicas do
//! not drift apart.
//!
//! Reads are served by the configured primary, or by a random child.

use super::merge::{ChildCache, all_succeeded, fan_out, log_failures, max_count};
use crate::config::{CacheConfig, ReplicationConfig};
use crate::core::{
    Aggregate, CacheClient, CacheError, Result, ScoredMember, Timeout, Value,
};
use crate::registry::CacheRegistry;
use futures::future::BoxFuture;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ReplicationCache {
    id: String,
    children: Vec<ChildCache>,
    primary: Option<usize>,
}

impl ReplicationCache {
    /// `primary`, when given, must be one of the child ids
    pub fn new(
        id: impl Into<String>,
        children: Vec<ChildCache>,
        primary: Option<&str>,
    ) -> Result<Self> {
        let id = id.into();
        if children.is_empty() {
            return Err(CacheError::invalid_config(
                id,
                "replication needs at least one child",
            ));
        }

        let primary = match primary {
            Some(name) => Some(
                children
                    .iter()
                    .position(|child| child.id == name)
                    .ok_or_else(|| {
                        CacheError::invalid_config(
                            &id,
                            format!("primary '{}' is not a child", name),
                        )
                    })?,
            ),
            None => None,
        };

        info!(
            "Replication cache '{}' ready: children={}, primary={}",
            id,
            children.len(),
            primary.map_or("random", |index| children[index].id.as_str())
        );

        Ok(Self {
            id,
            children,
            primary,
        })
    }

    pub fn from_config(id: &str, config: &CacheConfig, registry: &CacheRegistry) -> Result<Self> {
        let options: ReplicationConfig = config.parse_options()?;
        let mut children = Vec::with_capacity(options.children.len());
        for (child_id, child_config) in options.children.iter() {
            children.push(ChildCache::new(
                child_id,
                registry.create(child_id, child_config)?,
            ));
        }
        Self::new(id, children, options.primary.as_deref())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn children(&self) -> &[ChildCache] {
        &self.children
    }

    /// Child serving reads for this call
    fn reader(&self, op: &str) -> &ChildCache {
        let child = match self.primary {
            Some(index) => &self.children[index],
            None => self
                .children
                .choose(&mut rand::thread_rng())
                .unwrap_or(&self.children[0]),
        };
        debug!("Cache '{}': {} served by '{}'", self.id, op, child.id);
        child
    }

    async fn write_all<'a, F>(&'a self, op: &str, call: F) -> bool
    where
        F: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<bool>>,
    {
        let outcomes = fan_out(&self.children, call).await;
        all_succeeded(&self.id, op, outcomes)
    }

    /// Apply a counter update on every child in order. The first failure
    /// stops the walk and runs `undo` on every child; the result is then `None`.
    async fn counter<'a, T, F, U>(&'a self, op: &str, key: &str, call: F, undo: U) -> Option<T>
    where
        F: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<Option<T>>>,
        U: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<bool>>,
    {
        let mut last = None;
        for child in &self.children {
            match call(child.cache.as_ref()).await {
                Ok(Some(value)) => last = Some(value),
                outcome => {
                    if let Err(e) = outcome {
                        warn!("Cache '{}': {} failed on child '{}': {}", self.id, op, child.id, e);
                    }
                    warn!(
                        "Cache '{}': {} '{}' failed on '{}', removing it from every child",
                        self.id, op, key, child.id
                    );
                    let outcomes = fan_out(&self.children, undo).await;
                    log_failures(&self.id, op, outcomes);
                    return None;
                }
            }
        }
        last
    }

    /// Pop from every child; the value popped by the last child wins
    async fn pop_all<'a, F>(&'a self, op: &str, call: F) -> Result<Option<Value>>
    where
        F: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<Option<Value>>>,
    {
        let mut outcomes = fan_out(&self.children, call).await;
        let last = outcomes.pop().map(|(_, outcome)| outcome);
        log_failures(&self.id, op, outcomes);
        last.unwrap_or(Ok(None))
    }

    /// Blocking pop on the reading child, then plain pops everywhere else so
    /// the other replicas drop the same element
    async fn block_pop<'a, B, P>(&'a self, op: &str, block: B, pop: P) -> Result<Option<Value>>
    where
        B: FnOnce(&'a dyn CacheClient) -> BoxFuture<'a, Result<Option<Value>>>,
        P: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<Option<Value>>>,
    {
        let reader = self.reader(op);
        let value = block(reader.cache.as_ref()).await?;
        if value.is_some() {
            let others = self
                .children
                .iter()
                .filter(|child| !std::ptr::eq(*child, reader))
                .collect::<Vec<&ChildCache>>();
            let outcomes = fan_out(others, pop).await;
            log_failures(&self.id, op, outcomes);
        }
        Ok(value)
    }
}

#[async_trait]
impl CacheClient for ReplicationCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.reader("get").cache.get(key).await
    }

    async fn get_values(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        self.reader("get_values").cache.get_values(keys).await
    }

    async fn get_key_to_value(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        self.reader("get_key_to_value").cache.get_key_to_value(keys).await
    }

    async fn set(&self, key: &str, value: Value, timeout: Timeout, noreply: bool) -> Result<bool> {
        Ok(self
            .write_all("set", |cache| cache.set(key, value.clone(), timeout, noreply))
            .await)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        Ok(self
            .write_all("set_if_absent", |cache| {
                cache.set_if_absent(key, value.clone(), timeout, noreply)
            })
            .await)
    }

    async fn set_many(
        &self,
        pairs: Vec<(String, Value)>,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        Ok(self
            .write_all("set_many", |cache| cache.set_many(pairs.clone(), timeout, noreply))
            .await)
    }

    async fn delete(&self, key: &str, noreply: bool) -> Result<bool> {
        Ok(self
            .write_all("delete", |cache| cache.delete(key, noreply))
            .await)
    }

    async fn delete_many(&self, keys: &[&str], noreply: bool) -> Result<bool> {
        Ok(self
            .write_all("delete_many", |cache| cache.delete_many(keys, noreply))
            .await)
    }

    async fn incr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>> {
        Ok(self
            .counter(
                "incr",
                key,
                |cache| cache.incr(key, delta, noreply),
                |cache| cache.delete(key, noreply),
            )
            .await)
    }

    async fn decr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>> {
        Ok(self
            .counter(
                "decr",
                key,
                |cache| cache.decr(key, delta, noreply),
                |cache| cache.delete(key, noreply),
            )
            .await)
    }

    async fn clear(&self) -> Result<bool> {
        Ok(self.write_all("clear", |cache| cache.clear()).await)
    }

    async fn expire(&self, key: &str, timeout: Timeout) -> Result<bool> {
        Ok(self
            .write_all("expire", |cache| cache.expire(key, timeout))
            .await)
    }

    async fn block_left_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.block_pop(
            "block_left_pop",
            |cache| cache.block_left_pop(key, timeout),
            |cache| cache.lpop(key),
        )
        .await
    }

    async fn block_right_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.block_pop(
            "block_right_pop",
            |cache| cache.block_right_pop(key, timeout),
            |cache| cache.rpop(key),
        )
        .await
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<Value>> {
        self.reader("lindex").cache.lindex(key, index).await
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        self.reader("llen").cache.llen(key).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<Value>> {
        self.pop_all("lpop", |cache| cache.lpop(key)).await
    }

    async fn lpush(&self, key: &str, value: Value) -> Result<bool> {
        Ok(self
            .write_all("lpush", |cache| cache.lpush(key, value.clone()))
            .await)
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<Value>> {
        self.reader("lrange").cache.lrange(key, start, end).await
    }

    async fn ltrim(&self, key: &str, start: i64, end: i64) -> Result<bool> {
        Ok(self
            .write_all("ltrim", |cache| cache.ltrim(key, start, end))
            .await)
    }

    async fn rpop(&self, key: &str) -> Result<Option<Value>> {
        self.pop_all("rpop", |cache| cache.rpop(key)).await
    }

    async fn rpush(&self, key: &str, value: Value) -> Result<bool> {
        Ok(self
            .write_all("rpush", |cache| cache.rpush(key, value.clone()))
            .await)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Value>> {
        self.reader("hgetall").cache.hgetall(key).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Value>> {
        self.reader("hget").cache.hget(key, field).await
    }

    async fn hset(
        &self,
        key: &str,
        field: &str,
        value: Value,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        Ok(self
            .write_all("hset", |cache| {
                cache.hset(key, field, value.clone(), timeout, noreply)
            })
            .await)
    }

    async fn hdel(&self, key: &str, field: &str, noreply: bool) -> Result<bool> {
        Ok(self
            .write_all("hdel", |cache| cache.hdel(key, field, noreply))
            .await)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.reader("hexists").cache.hexists(key, field).await
    }

    async fn hlen(&self, key: &str) -> Result<usize> {
        self.reader("hlen").cache.hlen(key).await
    }

    async fn sadd(&self, key: &str, value: Value) -> Result<bool> {
        Ok(self
            .write_all("sadd", |cache| cache.sadd(key, value.clone()))
            .await)
    }

    async fn sadd_many(&self, key: &str, values: Vec<Value>) -> Result<bool> {
        Ok(self
            .write_all("sadd_many", |cache| cache.sadd_many(key, values.clone()))
            .await)
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        self.reader("scard").cache.scard(key).await
    }

    async fn sismember(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.reader("sismember").cache.sismember(key, value).await
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<Value>> {
        self.reader("smembers").cache.smembers(key).await
    }

    async fn srandmember(&self, key: &str) -> Result<Option<Value>> {
        self.reader("srandmember").cache.srandmember(key).await
    }

    async fn srem(&self, key: &str, value: &[u8]) -> Result<bool> {
        Ok(self
            .write_all("srem", |cache| cache.srem(key, value))
            .await)
    }

    async fn zadd(&self, key: &str, member: Value, score: f64) -> Result<bool> {
        Ok(self
            .write_all("zadd", |cache| cache.zadd(key, member.clone(), score))
            .await)
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        self.reader("zcard").cache.zcard(key).await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.reader("zcount").cache.zcount(key, min, max).await
    }

    async fn zincrby(&self, key: &str, member: Value, delta: f64) -> Result<Option<f64>> {
        Ok(self
            .counter(
                "zincrby",
                key,
                |cache| cache.zincrby(key, member.clone(), delta),
                |cache| cache.zrem(key, &member),
            )
            .await)
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>> {
        self.reader("zrange").cache.zrange(key, start, end, reverse).await
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
        self.reader("zrangebyscore")
            .cache
            .zrangebyscore(key, min, max, offset, count, reverse)
            .await
    }

    async fn zrank(&self, key: &str, member: &[u8], reverse: bool) -> Result<Option<usize>> {
        self.reader("zrank").cache.zrank(key, member, reverse).await
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool> {
        Ok(self
            .write_all("zrem", |cache| cache.zrem(key, member))
            .await)
    }

    async fn zremrangebyrank(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<usize> {
        let outcomes = fan_out(&self.children, |cache| {
            cache.zremrangebyrank(key, start, end, reverse)
        })
        .await;
        Ok(max_count(&self.id, "zremrangebyrank", outcomes))
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        let outcomes =
            fan_out(&self.children, |cache| cache.zremrangebyscore(key, min, max)).await;
        Ok(max_count(&self.id, "zremrangebyscore", outcomes))
    }

    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>> {
        self.reader("zscore").cache.zscore(key, member).await
    }

    async fn zunionstore(&self, dest: &str, keys: &[&str], aggregate: Aggregate) -> Result<usize> {
        let outcomes =
            fan_out(&self.children, |cache| cache.zunionstore(dest, keys, aggregate)).await;
        Ok(max_count(&self.id, "zunionstore", outcomes))
    }
}

//! Tiered cache chain
//!
//! Layers go from fastest (index 0) to the authoritative primary (last).
//! Scalar and hash writes land on the primary first and only then on the
//! faster layers, nearest to the primary first. `get` and `hget` scan from
//! layer 0 and copy a hit back into every faster layer. Lists, sets and
//! sorted sets live on the primary alone.
//!
//! Once a fast layer holds a value, reads stop there: a write that bypassed
//! this cache and went straight to the primary stays invisible until the
//! fast copy expires.

use super::merge::{ChildCache, fan_out};
use crate::config::{CacheConfig, MultilayerConfig};
use crate::core::{
    Aggregate, CacheClient, CacheError, Result, ScoredMember, Timeout, Value,
};
use crate::registry::CacheRegistry;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct MultilayerCache {
    id: String,
    layers: Vec<ChildCache>,
}

impl MultilayerCache {
    pub fn new(id: impl Into<String>, layers: Vec<ChildCache>) -> Result<Self> {
        let id = id.into();
        if layers.is_empty() {
            return Err(CacheError::invalid_config(
                id,
                "multilayer needs at least one layer",
            ));
        }

        info!(
            "Multilayer cache '{}' ready: layers={}, primary='{}'",
            id,
            layers.len(),
            layers[layers.len() - 1].id
        );

        Ok(Self { id, layers })
    }

    /// Layers come from `children`, fastest first. A layer's `id` option
    /// names it; unnamed layers are called `<id>.<index>`.
    pub fn from_config(id: &str, config: &CacheConfig, registry: &CacheRegistry) -> Result<Self> {
        let options: MultilayerConfig = config.parse_options()?;
        let mut layers = Vec::with_capacity(options.children.len());
        for (index, layer_config) in options.children.iter().enumerate() {
            let layer_id = layer_config
                .option::<String>("id")?
                .unwrap_or_else(|| format!("{}.{}", id, index));
            let cache = registry.create(&layer_id, layer_config)?;
            layers.push(ChildCache::new(layer_id, cache));
        }
        Self::new(id, layers)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn layers(&self) -> &[ChildCache] {
        &self.layers
    }

    fn primary(&self) -> &ChildCache {
        &self.layers[self.layers.len() - 1]
    }

    /// Every layer but the primary, nearest to the primary first
    fn secondaries(&self) -> impl Iterator<Item = &ChildCache> {
        self.layers[..self.layers.len() - 1].iter().rev()
    }

    /// Primary first; the other layers only if the primary succeeded.
    /// Their outcomes do not change the result.
    async fn write_through<'a, F>(&'a self, op: &str, key: &str, call: F) -> bool
    where
        F: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<bool>>,
    {
        if !self.write_primary(op, key, call(self.primary().cache.as_ref())).await {
            return false;
        }
        self.write_secondaries(op, key, call).await;
        true
    }

    async fn write_primary(
        &self,
        op: &str,
        key: &str,
        write: BoxFuture<'_, Result<bool>>,
    ) -> bool {
        match write.await {
            Ok(true) => true,
            Ok(false) => {
                debug!("Cache '{}': {} '{}' rejected by primary", self.id, op, key);
                false
            }
            Err(e) => {
                warn!("Cache '{}': {} '{}' failed on primary: {}", self.id, op, key, e);
                false
            }
        }
    }

    async fn write_secondaries<'a, F>(&'a self, op: &str, key: &str, call: F)
    where
        F: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<bool>>,
    {
        let outcomes = fan_out(self.secondaries(), call).await;
        log_layer_outcomes(&self.id, op, key, outcomes);
    }

    /// Copy a hit at layer `hit` into every faster layer, nearest first
    /// First layer holding `key`, from layer 0 down. A failing fast layer
    /// counts as a miss; only the primary's error reaches the caller.
    async fn scan<'a, F>(&'a self, op: &str, key: &str, read: F) -> Result<Option<(usize, Value)>>
    where
        F: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<Option<Value>>>,
    {
        let primary = self.layers.len() - 1;
        for (index, layer) in self.layers.iter().enumerate() {
            match read(layer.cache.as_ref()).await {
                Ok(Some(value)) => return Ok(Some((index, value))),
                Ok(None) => {}
                Err(e) if index < primary => warn!(
                    "Cache '{}': {} '{}' failed on layer '{}', treating as miss: {}",
                    self.id, op, key, layer.id, e
                ),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn promote<'a, F>(&'a self, op: &str, key: &str, hit: usize, call: F)
    where
        F: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<bool>>,
    {
        debug!(
            "Cache '{}': {} '{}' hit layer '{}', promoting",
            self.id, op, key, self.layers[hit].id
        );
        let outcomes = fan_out(self.layers[..hit].iter().rev(), call).await;
        log_layer_outcomes(&self.id, op, key, outcomes);
    }

    /// Drop `key` from every layer but the primary
    async fn invalidate(&self, op: &str, key: &str, noreply: bool) {
        self.write_secondaries(op, key, |cache| cache.delete(key, noreply))
            .await;
    }
}

fn log_layer_outcomes(cache: &str, op: &str, key: &str, outcomes: Vec<(&str, Result<bool>)>) {
    for (layer, outcome) in outcomes {
        match outcome {
            Ok(true) => {}
            Ok(false) => debug!(
                "Cache '{}': {} '{}' rejected by layer '{}'",
                cache, op, key, layer
            ),
            Err(e) => debug!(
                "Cache '{}': {} '{}' failed on layer '{}': {}",
                cache, op, key, layer, e
            ),
        }
    }
}

#[async_trait]
impl CacheClient for MultilayerCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let Some((index, value)) = self.scan("get", key, |cache| cache.get(key)).await? else {
            return Ok(None);
        };
        if index > 0 {
            self.promote("get", key, index, |cache| {
                cache.set(key, value.clone(), Timeout::Default, false)
            })
            .await;
        }
        Ok(Some(value))
    }

    async fn get_values(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        self.primary().cache.get_values(keys).await
    }

    async fn get_key_to_value(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        self.primary().cache.get_key_to_value(keys).await
    }

    async fn set(&self, key: &str, value: Value, timeout: Timeout, noreply: bool) -> Result<bool> {
        Ok(self
            .write_through("set", key, |cache| {
                cache.set(key, value.clone(), timeout, noreply)
            })
            .await)
    }

    /// Conditional on the primary only; faster layers take a plain set
    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        let primary = self
            .primary()
            .cache
            .set_if_absent(key, value.clone(), timeout, noreply);
        if !self.write_primary("set_if_absent", key, primary).await {
            return Ok(false);
        }
        self.write_secondaries("set_if_absent", key, |cache| {
            cache.set(key, value.clone(), timeout, noreply)
        })
        .await;
        Ok(true)
    }

    async fn set_many(
        &self,
        pairs: Vec<(String, Value)>,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        Ok(self
            .write_through("set_many", "*", |cache| {
                cache.set_many(pairs.clone(), timeout, noreply)
            })
            .await)
    }

    async fn delete(&self, key: &str, noreply: bool) -> Result<bool> {
        Ok(self
            .write_through("delete", key, |cache| cache.delete(key, noreply))
            .await)
    }

    async fn delete_many(&self, keys: &[&str], noreply: bool) -> Result<bool> {
        Ok(self
            .write_through("delete_many", "*", |cache| cache.delete_many(keys, noreply))
            .await)
    }

    async fn incr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>> {
        let result = self.primary().cache.incr(key, delta, noreply).await;
        self.invalidate("incr", key, noreply).await;
        result
    }

    async fn decr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>> {
        let result = self.primary().cache.decr(key, delta, noreply).await;
        self.invalidate("decr", key, noreply).await;
        result
    }

    async fn clear(&self) -> Result<bool> {
        Ok(self.write_through("clear", "*", |cache| cache.clear()).await)
    }

    async fn expire(&self, key: &str, timeout: Timeout) -> Result<bool> {
        Ok(self
            .write_through("expire", key, |cache| cache.expire(key, timeout))
            .await)
    }

    async fn block_left_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.primary().cache.block_left_pop(key, timeout).await
    }

    async fn block_right_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.primary().cache.block_right_pop(key, timeout).await
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<Value>> {
        self.primary().cache.lindex(key, index).await
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        self.primary().cache.llen(key).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<Value>> {
        self.primary().cache.lpop(key).await
    }

    async fn lpush(&self, key: &str, value: Value) -> Result<bool> {
        self.primary().cache.lpush(key, value).await
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<Value>> {
        self.primary().cache.lrange(key, start, end).await
    }

    async fn ltrim(&self, key: &str, start: i64, end: i64) -> Result<bool> {
        self.primary().cache.ltrim(key, start, end).await
    }

    async fn rpop(&self, key: &str) -> Result<Option<Value>> {
        self.primary().cache.rpop(key).await
    }

    async fn rpush(&self, key: &str, value: Value) -> Result<bool> {
        self.primary().cache.rpush(key, value).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Value>> {
        self.primary().cache.hgetall(key).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Value>> {
        let Some((index, value)) = self
            .scan("hget", key, |cache| cache.hget(key, field))
            .await?
        else {
            return Ok(None);
        };
        if index > 0 {
            self.promote("hget", key, index, |cache| {
                cache.hset(key, field, value.clone(), Timeout::Default, false)
            })
            .await;
        }
        Ok(Some(value))
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
            .write_through("hset", key, |cache| {
                cache.hset(key, field, value.clone(), timeout, noreply)
            })
            .await)
    }

    async fn hdel(&self, key: &str, field: &str, noreply: bool) -> Result<bool> {
        Ok(self
            .write_through("hdel", key, |cache| cache.hdel(key, field, noreply))
            .await)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.primary().cache.hexists(key, field).await
    }

    async fn hlen(&self, key: &str) -> Result<usize> {
        self.primary().cache.hlen(key).await
    }

    async fn sadd(&self, key: &str, value: Value) -> Result<bool> {
        self.primary().cache.sadd(key, value).await
    }

    async fn sadd_many(&self, key: &str, values: Vec<Value>) -> Result<bool> {
        self.primary().cache.sadd_many(key, values).await
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        self.primary().cache.scard(key).await
    }

    async fn sismember(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.primary().cache.sismember(key, value).await
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<Value>> {
        self.primary().cache.smembers(key).await
    }

    async fn srandmember(&self, key: &str) -> Result<Option<Value>> {
        self.primary().cache.srandmember(key).await
    }

    async fn srem(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.primary().cache.srem(key, value).await
    }

    async fn zadd(&self, key: &str, member: Value, score: f64) -> Result<bool> {
        self.primary().cache.zadd(key, member, score).await
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        self.primary().cache.zcard(key).await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.primary().cache.zcount(key, min, max).await
    }

    async fn zincrby(&self, key: &str, member: Value, delta: f64) -> Result<Option<f64>> {
        self.primary().cache.zincrby(key, member, delta).await
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>> {
        self.primary().cache.zrange(key, start, end, reverse).await
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
        self.primary()
            .cache
            .zrangebyscore(key, min, max, offset, count, reverse)
            .await
    }

    async fn zrank(&self, key: &str, member: &[u8], reverse: bool) -> Result<Option<usize>> {
        self.primary().cache.zrank(key, member, reverse).await
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool> {
        self.primary().cache.zrem(key, member).await
    }

    async fn zremrangebyrank(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<usize> {
        self.primary()
            .cache
            .zremrangebyrank(key, start, end, reverse)
            .await
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.primary().cache.zremrangebyscore(key, min, max).await
    }

    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>> {
        self.primary().cache.zscore(key, member).await
    }

    async fn zunionstore(&self, dest: &str, keys: &[&str], aggregate: Aggregate) -> Result<usize> {
        self.primary().cache.zunionstore(dest, keys, aggregate).await
    }
}

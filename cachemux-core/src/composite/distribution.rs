//! Sharding across children
//!
//! Every key is owned by exactly one child, chosen by the routing strategy.
//! A key no child owns behaves like a miss on reads and a failure on writes.
//! Multi-key operations group keys by owner and issue one call per owner;
//! if any key has no owner the whole operation fails without touching a child.

use super::merge::{ChildCache, all_succeeded, fan_out};
use crate::config::{CacheConfig, DistributionConfig};
use crate::core::{
    Aggregate, CacheClient, CacheError, Result, ScoredMember, Timeout, Value,
};
use crate::registry::CacheRegistry;
use crate::routing::{DEFAULT_REPLICAS, HashRing, RoutingMethod, RoutingStrategy, ShardId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Route `$key` to its owner and run `$call` against it, or return the
/// operation's failure value when nobody owns the key
macro_rules! routed {
    ($self:ident, $op:literal, $key:expr, |$cache:ident| $call:expr) => {
        match $self.shard_index($op, $key) {
            Some(index) => {
                let $cache = &$self.children[index].cache;
                $call.await
            }
            None => Ok(Default::default()),
        }
    };
}

/// Keys grouped by owning child, with each key's position in the request
type KeyGroups<'c, 'k> = Vec<(&'c ChildCache, Vec<(usize, &'k str)>)>;

#[derive(Debug)]
pub struct DistributionCache {
    id: String,
    strategy: RoutingStrategy,
    children: Vec<ChildCache>,
    shards: HashMap<ShardId, usize>,
}

impl DistributionCache {
    /// Build a distribution over `children`.
    ///
    /// With a bucketed strategy every child id must parse as an integer
    /// bucket; with `conhash` the ring's node names must be the child ids.
    pub fn new(
        id: impl Into<String>,
        strategy: RoutingStrategy,
        children: Vec<ChildCache>,
    ) -> Result<Self> {
        let id = id.into();
        if children.is_empty() {
            return Err(CacheError::invalid_config(
                id,
                "distribution needs at least one child",
            ));
        }

        let method = strategy.method();
        let mut shards = HashMap::with_capacity(children.len());
        for (index, child) in children.iter().enumerate() {
            let shard = if method.is_bucketed() {
                let bucket = child.id.trim().parse::<i64>().map_err(|_| {
                    CacheError::invalid_config(
                        &id,
                        format!(
                            "child id '{}' is not an integer bucket, required by method '{}'",
                            child.id, method
                        ),
                    )
                })?;
                ShardId::Bucket(bucket)
            } else {
                ShardId::Name(child.id.clone())
            };

            if shards.insert(shard, index).is_some() {
                return Err(CacheError::invalid_config(
                    &id,
                    format!("duplicate child id '{}'", child.id),
                ));
            }
        }

        info!(
            "Distribution cache '{}' ready: method={}, children={}",
            id,
            method,
            children.len()
        );

        Ok(Self {
            id,
            strategy,
            children,
            shards,
        })
    }

    /// Build from `type: distribution` options, creating children through `registry`
    pub fn from_config(id: &str, config: &CacheConfig, registry: &CacheRegistry) -> Result<Self> {
        let options: DistributionConfig = config.parse_options()?;
        if options.children.is_empty() {
            return Err(CacheError::invalid_config(
                id,
                "distribution needs at least one child",
            ));
        }

        let strategy = match options.method {
            RoutingMethod::ConHash => {
                let mut nodes = Vec::with_capacity(options.children.len());
                for (child_id, child_config) in options.children.iter() {
                    let replicas = child_config
                        .option::<u32>("replica")?
                        .unwrap_or(DEFAULT_REPLICAS);
                    if replicas == 0 {
                        return Err(CacheError::invalid_config(
                            id,
                            format!("child '{}' has replica 0", child_id),
                        ));
                    }
                    nodes.push((child_id, replicas));
                }
                RoutingStrategy::ConHash(HashRing::from_nodes(options.hash_method, nodes))
            }
            method => RoutingStrategy::modular(
                id,
                method,
                options.key_regex.as_deref(),
                options.factor,
            )?,
        };

        let mut children = Vec::with_capacity(options.children.len());
        for (child_id, child_config) in options.children.iter() {
            children.push(ChildCache::new(
                child_id,
                registry.create(child_id, child_config)?,
            ));
        }

        Self::new(id, strategy, children)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn strategy(&self) -> &RoutingStrategy {
        &self.strategy
    }

    pub fn children(&self) -> &[ChildCache] {
        &self.children
    }

    /// Id of the child owning `key`
    pub fn route(&self, key: &str) -> Option<&str> {
        self.lookup(key).map(|index| self.children[index].id.as_str())
    }

    /// Client of the child owning `key`
    pub fn client_for(&self, key: &str) -> Option<Arc<dyn CacheClient>> {
        self.lookup(key)
            .map(|index| Arc::clone(&self.children[index].cache))
    }

    fn lookup(&self, key: &str) -> Option<usize> {
        let shard = self.strategy.route(key)?;
        self.shards.get(&shard).copied()
    }

    fn shard_index(&self, op: &str, key: &str) -> Option<usize> {
        match self.lookup(key) {
            Some(index) => {
                debug!(
                    "Cache '{}': {} '{}' -> child '{}'",
                    self.id, op, key, self.children[index].id
                );
                Some(index)
            }
            None => {
                warn!("Cache '{}': no child owns key '{}' ({})", self.id, key, op);
                None
            }
        }
    }

    /// Group keys by owner, in order of first appearance.
    /// `None` if any key has no owner.
    fn group<'k>(
        &self,
        op: &str,
        keys: impl IntoIterator<Item = &'k str>,
    ) -> Option<KeyGroups<'_, 'k>> {
        let mut groups: Vec<(usize, Vec<(usize, &'k str)>)> = Vec::new();
        for (position, key) in keys.into_iter().enumerate() {
            let index = self.shard_index(op, key)?;
            match groups.iter_mut().find(|(owner, _)| *owner == index) {
                Some((_, members)) => members.push((position, key)),
                None => groups.push((index, vec![(position, key)])),
            }
        }
        Some(
            groups
                .into_iter()
                .map(|(index, members)| (&self.children[index], members))
                .collect(),
        )
    }
}

fn group_keys<'k>(members: &[(usize, &'k str)]) -> Vec<&'k str> {
    members.iter().map(|(_, key)| *key).collect()
}

#[async_trait]
impl CacheClient for DistributionCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        routed!(self, "get", key, |cache| cache.get(key))
    }

    async fn get_values(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        let mut values = vec![None; keys.len()];
        let Some(groups) = self.group("get_values", keys.iter().copied()) else {
            return Ok(values);
        };

        for (child, members) in groups {
            let found = child.cache.get_values(&group_keys(&members)).await?;
            for ((position, _), value) in members.into_iter().zip(found) {
                values[position] = value;
            }
        }
        Ok(values)
    }

    async fn get_key_to_value(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let Some(groups) = self.group("get_key_to_value", keys.iter().copied()) else {
            return Ok(HashMap::new());
        };

        let mut found = HashMap::with_capacity(keys.len());
        for (child, members) in groups {
            found.extend(child.cache.get_key_to_value(&group_keys(&members)).await?);
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: Value, timeout: Timeout, noreply: bool) -> Result<bool> {
        routed!(self, "set", key, |cache| cache.set(key, value, timeout, noreply))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        routed!(self, "set_if_absent", key, |cache| cache
            .set_if_absent(key, value, timeout, noreply))
    }

    async fn set_many(
        &self,
        pairs: Vec<(String, Value)>,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        let mut groups: Vec<(usize, Vec<(String, Value)>)> = Vec::new();
        for (key, value) in pairs {
            let Some(index) = self.shard_index("set_many", &key) else {
                return Ok(false);
            };
            match groups.iter_mut().find(|(owner, _)| *owner == index) {
                Some((_, members)) => members.push((key, value)),
                None => groups.push((index, vec![(key, value)])),
            }
        }

        let mut outcomes = Vec::with_capacity(groups.len());
        for (index, members) in groups {
            let child = &self.children[index];
            let outcome = child.cache.set_many(members, timeout, noreply).await;
            outcomes.push((child.id.as_str(), outcome));
        }
        Ok(all_succeeded(&self.id, "set_many", outcomes))
    }

    async fn delete(&self, key: &str, noreply: bool) -> Result<bool> {
        routed!(self, "delete", key, |cache| cache.delete(key, noreply))
    }

    async fn delete_many(&self, keys: &[&str], noreply: bool) -> Result<bool> {
        let Some(groups) = self.group("delete_many", keys.iter().copied()) else {
            return Ok(false);
        };

        let mut outcomes = Vec::with_capacity(groups.len());
        for (child, members) in groups {
            let outcome = child.cache.delete_many(&group_keys(&members), noreply).await;
            outcomes.push((child.id.as_str(), outcome));
        }
        Ok(all_succeeded(&self.id, "delete_many", outcomes))
    }

    async fn incr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>> {
        routed!(self, "incr", key, |cache| cache.incr(key, delta, noreply))
    }

    async fn decr(&self, key: &str, delta: i64, noreply: bool) -> Result<Option<i64>> {
        routed!(self, "decr", key, |cache| cache.decr(key, delta, noreply))
    }

    async fn clear(&self) -> Result<bool> {
        let outcomes = fan_out(&self.children, |cache| cache.clear()).await;
        Ok(all_succeeded(&self.id, "clear", outcomes))
    }

    async fn expire(&self, key: &str, timeout: Timeout) -> Result<bool> {
        routed!(self, "expire", key, |cache| cache.expire(key, timeout))
    }

    async fn block_left_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        routed!(self, "block_left_pop", key, |cache| cache
            .block_left_pop(key, timeout))
    }

    async fn block_right_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        routed!(self, "block_right_pop", key, |cache| cache
            .block_right_pop(key, timeout))
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<Value>> {
        routed!(self, "lindex", key, |cache| cache.lindex(key, index))
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        routed!(self, "llen", key, |cache| cache.llen(key))
    }

    async fn lpop(&self, key: &str) -> Result<Option<Value>> {
        routed!(self, "lpop", key, |cache| cache.lpop(key))
    }

    async fn lpush(&self, key: &str, value: Value) -> Result<bool> {
        routed!(self, "lpush", key, |cache| cache.lpush(key, value))
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<Value>> {
        routed!(self, "lrange", key, |cache| cache.lrange(key, start, end))
    }

    async fn ltrim(&self, key: &str, start: i64, end: i64) -> Result<bool> {
        routed!(self, "ltrim", key, |cache| cache.ltrim(key, start, end))
    }

    async fn rpop(&self, key: &str) -> Result<Option<Value>> {
        routed!(self, "rpop", key, |cache| cache.rpop(key))
    }

    async fn rpush(&self, key: &str, value: Value) -> Result<bool> {
        routed!(self, "rpush", key, |cache| cache.rpush(key, value))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Value>> {
        routed!(self, "hgetall", key, |cache| cache.hgetall(key))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Value>> {
        routed!(self, "hget", key, |cache| cache.hget(key, field))
    }

    async fn hset(
        &self,
        key: &str,
        field: &str,
        value: Value,
        timeout: Timeout,
        noreply: bool,
    ) -> Result<bool> {
        routed!(self, "hset", key, |cache| cache
            .hset(key, field, value, timeout, noreply))
    }

    async fn hdel(&self, key: &str, field: &str, noreply: bool) -> Result<bool> {
        routed!(self, "hdel", key, |cache| cache.hdel(key, field, noreply))
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        routed!(self, "hexists", key, |cache| cache.hexists(key, field))
    }

    async fn hlen(&self, key: &str) -> Result<usize> {
        routed!(self, "hlen", key, |cache| cache.hlen(key))
    }

    async fn sadd(&self, key: &str, value: Value) -> Result<bool> {
        routed!(self, "sadd", key, |cache| cache.sadd(key, value))
    }

    async fn sadd_many(&self, key: &str, values: Vec<Value>) -> Result<bool> {
        routed!(self, "sadd_many", key, |cache| cache.sadd_many(key, values))
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        routed!(self, "scard", key, |cache| cache.scard(key))
    }

    async fn sismember(&self, key: &str, value: &[u8]) -> Result<bool> {
        routed!(self, "sismember", key, |cache| cache.sismember(key, value))
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<Value>> {
        routed!(self, "smembers", key, |cache| cache.smembers(key))
    }

    async fn srandmember(&self, key: &str) -> Result<Option<Value>> {
        routed!(self, "srandmember", key, |cache| cache.srandmember(key))
    }

    async fn srem(&self, key: &str, value: &[u8]) -> Result<bool> {
        routed!(self, "srem", key, |cache| cache.srem(key, value))
    }

    async fn zadd(&self, key: &str, member: Value, score: f64) -> Result<bool> {
        routed!(self, "zadd", key, |cache| cache.zadd(key, member, score))
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        routed!(self, "zcard", key, |cache| cache.zcard(key))
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        routed!(self, "zcount", key, |cache| cache.zcount(key, min, max))
    }

    async fn zincrby(&self, key: &str, member: Value, delta: f64) -> Result<Option<f64>> {
        routed!(self, "zincrby", key, |cache| cache.zincrby(key, member, delta))
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>> {
        routed!(self, "zrange", key, |cache| cache.zrange(key, start, end, reverse))
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
        routed!(self, "zrangebyscore", key, |cache| cache
            .zrangebyscore(key, min, max, offset, count, reverse))
    }

    async fn zrank(&self, key: &str, member: &[u8], reverse: bool) -> Result<Option<usize>> {
        routed!(self, "zrank", key, |cache| cache.zrank(key, member, reverse))
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool> {
        routed!(self, "zrem", key, |cache| cache.zrem(key, member))
    }

    async fn zremrangebyrank(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<usize> {
        routed!(self, "zremrangebyrank", key, |cache| cache
            .zremrangebyrank(key, start, end, reverse))
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        routed!(self, "zremrangebyscore", key, |cache| cache
            .zremrangebyscore(key, min, max))
    }

    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>> {
        routed!(self, "zscore", key, |cache| cache.zscore(key, member))
    }

    /// Only delegated when `dest` and every source key live on the same child
    async fn zunionstore(&self, dest: &str, keys: &[&str], aggregate: Aggregate) -> Result<usize> {
        let Some(owner) = self.shard_index("zunionstore", dest) else {
            return Ok(0);
        };
        for key in keys {
            if self.lookup(key) != Some(owner) {
                warn!(
                    "Cache '{}': zunionstore into '{}' spans children (key '{}')",
                    self.id, dest, key
                );
                return Ok(0);
            }
        }
        self.children[owner]
            .cache
            .zunionstore(dest, keys, aggregate)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCache;

    fn mocks(ids: &[&str]) -> (Vec<MockCache>, Vec<ChildCache>) {
        let mocks: Vec<MockCache> = ids.iter().map(|id| MockCache::new(*id)).collect();
        let children = mocks
            .iter()
            .map(|mock| ChildCache::new(mock.id(), Arc::new(mock.clone()) as Arc<dyn CacheClient>))
            .collect();
        (mocks, children)
    }

    fn user_mod(ids: &[&str]) -> (Vec<MockCache>, DistributionCache) {
        let (mocks, children) = mocks(ids);
        let strategy =
            RoutingStrategy::modular("users", RoutingMethod::Mod, Some(r"user:(\d+)"), Some(2))
                .unwrap();
        (mocks, DistributionCache::new("users", strategy, children).unwrap())
    }

    #[tokio::test]
    async fn test_routes_to_owning_child_only() {
        let (mocks, cache) = user_mod(&["0", "1"]);
        assert!(cache.set("user:17", b"x".to_vec(), Timeout::Default, false).await.unwrap());

        assert!(mocks[0].operations().is_empty());
        assert_eq!(mocks[1].inner().get("user:17").await.unwrap(), Some(b"x".to_vec()));
        assert_eq!(cache.route("user:17"), Some("1"));
        assert_eq!(cache.get("user:17").await.unwrap(), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_unroutable_key_returns_failure_value() {
        let (mocks, cache) = user_mod(&["0", "1"]);

        assert!(!cache.set("session:9", b"x".to_vec(), Timeout::Default, false).await.unwrap());
        assert_eq!(cache.get("session:9").await.unwrap(), None);
        assert_eq!(cache.llen("session:9").await.unwrap(), 0);
        assert!(mocks.iter().all(|mock| mock.operations().is_empty()));
    }

    #[tokio::test]
    async fn test_bucket_without_child_is_unroutable() {
        let (mocks, cache) = user_mod(&["0"]);
        assert_eq!(cache.route("user:3"), None);
        assert!(!cache.lpush("user:3", b"x".to_vec()).await.unwrap());
        assert!(mocks[0].operations().is_empty());
    }

    #[tokio::test]
    async fn test_get_values_groups_per_child_and_keeps_order() {
        let (mocks, cache) = user_mod(&["0", "1"]);
        cache
            .set_many(
                vec![
                    ("user:1".to_string(), b"one".to_vec()),
                    ("user:2".to_string(), b"two".to_vec()),
                    ("user:3".to_string(), b"three".to_vec()),
                ],
                Timeout::Default,
                false,
            )
            .await
            .unwrap();

        let values = cache
            .get_values(&["user:3", "user:2", "user:5", "user:1"])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Some(b"three".to_vec()), Some(b"two".to_vec()), None, Some(b"one".to_vec())]
        );

        let odd_reads: Vec<String> = mocks[1]
            .operations()
            .into_iter()
            .filter(|op| op.op == "get_values")
            .map(|op| op.key)
            .collect();
        assert_eq!(odd_reads, vec!["user:3,user:5,user:1".to_string()]);
    }

    #[tokio::test]
    async fn test_multi_key_fails_whole_when_one_key_unroutable() {
        let (mocks, cache) = user_mod(&["0", "1"]);
        assert!(!cache.delete_many(&["user:1", "bogus"], false).await.unwrap());
        assert_eq!(cache.get_values(&["user:1", "bogus"]).await.unwrap(), vec![None, None]);
        assert!(mocks.iter().all(|mock| mock.operations().is_empty()));
    }

    #[tokio::test]
    async fn test_clear_reaches_every_child() {
        let (mocks, cache) = user_mod(&["0", "1"]);
        assert!(cache.clear().await.unwrap());
        assert!(mocks.iter().all(|mock| mock.operations().len() == 1));

        mocks[0].fail_when(|op| op.op == "clear");
        assert!(!cache.clear().await.unwrap());
        assert_eq!(mocks[1].operations().len(), 2);
    }

    #[tokio::test]
    async fn test_zunionstore_requires_single_owner() {
        let (_mocks, cache) = user_mod(&["0", "1"]);
        cache.zadd("user:2", b"a".to_vec(), 1.0).await.unwrap();
        cache.zadd("user:4", b"b".to_vec(), 2.0).await.unwrap();
        cache.zadd("user:1", b"c".to_vec(), 3.0).await.unwrap();

        assert_eq!(
            cache.zunionstore("user:6", &["user:2", "user:4"], Aggregate::Sum).await.unwrap(),
            2
        );
        assert_eq!(
            cache.zunionstore("user:8", &["user:2", "user:1"], Aggregate::Sum).await.unwrap(),
            0
        );
    }

    #[test]
    fn test_rejects_non_integer_bucket_ids() {
        let (_mocks, children) = mocks(&["0", "east"]);
        let strategy =
            RoutingStrategy::modular("users", RoutingMethod::HashMod, None, Some(2)).unwrap();
        let err = DistributionCache::new("users", strategy, children).unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_conhash_routes_every_key_somewhere() {
        let (_mocks, children) = mocks(&["a", "b", "c"]);
        let ring = HashRing::from_nodes(
            Default::default(),
            [("a", DEFAULT_REPLICAS), ("b", DEFAULT_REPLICAS), ("c", DEFAULT_REPLICAS)],
        );
        let cache =
            DistributionCache::new("ring", RoutingStrategy::ConHash(ring), children).unwrap();

        for i in 0..50 {
            let key = format!("key:{}", i);
            assert!(cache.route(&key).is_some());
            assert!(cache.set(&key, b"v".to_vec(), Timeout::Default, false).await.unwrap());
            assert_eq!(cache.get(&key).await.unwrap(), Some(b"v".to_vec()));
        }
    }
}

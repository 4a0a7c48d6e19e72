//! In-process cache implementing the whole operation contract
//!
//! # Architecture
//! ```text
//! MemoryCache (Clone, shared state)
//!   ├─ Trie<key, StoredValue>   typed entries + absolute expiry
//!   ├─ Waiters                  per-key wake-ups for blocking pops
//!   └─ last_trim                lazy expired-entry sweep every trim_interval
//! ```
//!
//! Expired entries are invisible to reads immediately and are physically
//! removed by writes that touch them, by the periodic sweep, or by the
//! optional background task started with [`MemoryCache::start_ttl_cleanup`].

mod entry;
mod list;
mod sorted_set;

pub use sorted_set::{OrderedFloat, SortedSetValue};

use self::entry::{Collection, Data, StoredValue};
use self::list::{End, Waiters};
use crate::config::MemoryConfig;
use crate::core::{
    Aggregate, CacheClient, CacheError, Result, ScoredMember, Timeout, Value,
};
use crate::core::types::reverse_rank_range;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use radix_trie::{Trie, TrieCommon};
use rand::seq::IteratorRandom;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

type Keyspace = Trie<String, StoredValue>;

/// In-process cache backed by a radix trie
#[derive(Clone)]
pub struct MemoryCache {
    data: Arc<RwLock<Keyspace>>,
    waiters: Arc<Waiters>,
    last_trim: Arc<Mutex<Instant>>,
    config: MemoryConfig,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl MemoryCache {
    pub fn new(config: MemoryConfig) -> Self {
        debug!(
            "Initializing memory cache with timeout={}s, trim_interval={}s",
            config.timeout, config.trim_interval
        );

        Self {
            data: Arc::new(RwLock::new(Trie::new())),
            waiters: Arc::new(Waiters::default()),
            last_trim: Arc::new(Mutex::new(Instant::now())),
            config,
        }
    }

    /// Default expiration in seconds applied to `Timeout::Default` writes
    pub fn default_timeout(&self) -> u64 {
        self.config.timeout
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .read()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start background TTL cleanup task
    pub fn start_ttl_cleanup(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        info!("Starting TTL cleanup task (interval={:?})", interval);

        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cache.cleanup_expired();
            }
        })
    }

    /// Remove every expired entry now; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut data = self.data.write();

        let expired: Vec<String> = data
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        if !expired.is_empty() {
            debug!("Cleaning up {} expired keys", expired.len());
            for key in &expired {
                data.remove(key);
            }
        }
        drop(data);

        self.waiters.prune();
        expired.len()
    }

    fn maybe_trim(&self) {
        let now = Instant::now();
        {
            let mut last_trim = self.last_trim.lock();
            if now.duration_since(*last_trim) < Duration::from_secs(self.config.trim_interval) {
                return;
            }
            *last_trim = now;
        }
        self.cleanup_expired();
    }

    fn deadline(&self, timeout: Timeout) -> Option<Instant> {
        timeout.deadline(self.config.timeout, Instant::now())
    }

    /// Apply `f` to the live collection at `key`; `Ok(None)` if absent
    fn read<T: Collection, R>(&self, key: &str, f: impl FnOnce(&T) -> R) -> Result<Option<R>> {
        let data = self.data.read();
        match live(&data, key, Instant::now()) {
            Some(entry) => {
                let value = T::from_data(&entry.data)
                    .ok_or_else(|| wrong_type(key, entry.data.kind(), T::KIND))?;
                Ok(Some(f(value)))
            }
            None => Ok(None),
        }
    }

    fn update<T: Collection, R>(
        &self,
        key: &str,
        create: bool,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<Option<R>> {
        self.update_with_expiry(key, create, |value: &mut T, _| f(value))
    }

    /// Apply `f` to the collection at `key` and its expiry.
    /// Absent keys are created empty (without expiry) when `create` is set.
    /// Collections left empty are removed.
    fn update_with_expiry<T: Collection, R>(
        &self,
        key: &str,
        create: bool,
        f: impl FnOnce(&mut T, &mut Option<Instant>) -> R,
    ) -> Result<Option<R>> {
        self.maybe_trim();
        let mut data = self.data.write();

        if live_mut(&mut data, key, Instant::now()).is_none() {
            if !create {
                return Ok(None);
            }
            data.insert(
                key.to_string(),
                StoredValue::new(T::default().into_data(), None),
            );
        }
        let Some(entry) = data.get_mut(key) else {
            return Ok(None);
        };

        let kind = entry.data.kind();
        let value =
            T::from_data_mut(&mut entry.data).ok_or_else(|| wrong_type(key, kind, T::KIND))?;
        let result = f(&mut *value, &mut entry.expires_at);

        if value.is_empty() {
            data.remove(key);
        }
        Ok(Some(result))
    }

    fn insert_bytes(&self, key: &str, value: Value, timeout: Timeout) {
        let expires_at = self.deadline(timeout);
        self.data
            .write()
            .insert(key.to_string(), StoredValue::new(Data::Bytes(value), expires_at));
    }

    fn pop(&self, key: &str, end: End) -> Result<Option<Value>> {
        Ok(self
            .update::<VecDeque<Value>, _>(key, false, |list| end.pop(list))?
            .flatten())
    }

    fn push(&self, key: &str, value: Value, end: End) -> Result<bool> {
        self.update::<VecDeque<Value>, _>(key, true, |list| match end {
            End::Left => list.push_front(value),
            End::Right => list.push_back(value),
        })?;
        self.waiters.notify(key);
        Ok(true)
    }

    async fn block_pop(&self, key: &str, timeout_secs: u64, end: End) -> Result<Option<Value>> {
        // Subscribe first so a push racing with the first attempt still wakes us
        let rx = self.waiters.subscribe(key);
        if let Some(value) = self.pop(key, end)? {
            return Ok(Some(value));
        }

        if timeout_secs == 0 {
            return self.wait_and_pop(rx, key, end).await;
        }

        let duration = Duration::from_secs(timeout_secs);
        match tokio::time::timeout(duration, self.wait_and_pop(rx, key, end)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Blocking pop on {} timed out after {}s", key, timeout_secs);
                Ok(None)
            }
        }
    }

    async fn wait_and_pop(
        &self,
        mut rx: broadcast::Receiver<()>,
        key: &str,
        end: End,
    ) -> Result<Option<Value>> {
        loop {
            match rx.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
            if let Some(value) = self.pop(key, end)? {
                return Ok(Some(value));
            }
        }
    }
}

fn live<'a>(data: &'a Keyspace, key: &str, now: Instant) -> Option<&'a StoredValue> {
    data.get(key).filter(|entry| !entry.is_expired(now))
}

/// Like [`live`] but physically drops an expired entry
fn live_mut<'a>(data: &'a mut Keyspace, key: &str, now: Instant) -> Option<&'a mut StoredValue> {
    if data.get(key).is_some_and(|entry| entry.is_expired(now)) {
        data.remove(key);
        return None;
    }
    data.get_mut(key)
}

fn wrong_type(key: &str, found: &str, expected: &str) -> CacheError {
    CacheError::WrongType(format!(
        "key '{}' holds a {}, expected a {}",
        key, found, expected
    ))
}

fn parse_int(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let data = self.data.read();
        match live(&data, key, Instant::now()) {
            Some(StoredValue {
                data: Data::Bytes(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(entry) => Err(wrong_type(key, entry.data.kind(), "string")),
            None => Ok(None),
        }
    }

    /// Keys holding anything other than a plain value are treated as missing
    async fn get_key_to_value(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let data = self.data.read();
        let now = Instant::now();
        Ok(keys
            .iter()
            .filter_map(|key| match live(&data, key, now) {
                Some(StoredValue {
                    data: Data::Bytes(value),
                    ..
                }) => Some((key.to_string(), value.clone())),
                _ => None,
            })
            .collect())
    }

    async fn set(&self, key: &str, value: Value, timeout: Timeout, _noreply: bool) -> Result<bool> {
        self.maybe_trim();
        self.insert_bytes(key, value, timeout);
        Ok(true)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        timeout: Timeout,
        _noreply: bool,
    ) -> Result<bool> {
        self.maybe_trim();
        let expires_at = self.deadline(timeout);
        let mut data = self.data.write();
        if live_mut(&mut data, key, Instant::now()).is_some() {
            return Ok(false);
        }
        data.insert(key.to_string(), StoredValue::new(Data::Bytes(value), expires_at));
        Ok(true)
    }

    async fn delete(&self, key: &str, _noreply: bool) -> Result<bool> {
        self.maybe_trim();
        self.data.write().remove(key);
        Ok(true)
    }

    async fn incr(&self, key: &str, delta: i64, _noreply: bool) -> Result<Option<i64>> {
        let mut data = self.data.write();
        let (current, expires_at) = match live_mut(&mut data, key, Instant::now()) {
            None => (0, None),
            Some(StoredValue {
                data: Data::Bytes(bytes),
                expires_at,
            }) => match parse_int(bytes) {
                Some(current) => (current, *expires_at),
                None => return Ok(None),
            },
            Some(entry) => return Err(wrong_type(key, entry.data.kind(), "string")),
        };

        let Some(next) = current.checked_add(delta) else {
            return Ok(None);
        };
        data.insert(
            key.to_string(),
            StoredValue::new(Data::Bytes(next.to_string().into_bytes()), expires_at),
        );
        Ok(Some(next))
    }

    async fn clear(&self) -> Result<bool> {
        *self.data.write() = Trie::new();
        Ok(true)
    }

    async fn expire(&self, key: &str, timeout: Timeout) -> Result<bool> {
        let expires_at = self.deadline(timeout);
        let mut data = self.data.write();
        match live_mut(&mut data, key, Instant::now()) {
            Some(entry) => {
                entry.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ==================== List ====================

    async fn block_left_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.block_pop(key, timeout, End::Left).await
    }

    async fn block_right_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.block_pop(key, timeout, End::Right).await
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<Value>> {
        Ok(self
            .read::<VecDeque<Value>, _>(key, |items| list::index(items, index))?
            .flatten())
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        Ok(self
            .read::<VecDeque<Value>, _>(key, VecDeque::len)?
            .unwrap_or(0))
    }

    async fn lpop(&self, key: &str) -> Result<Option<Value>> {
        self.pop(key, End::Left)
    }

    async fn lpush(&self, key: &str, value: Value) -> Result<bool> {
        self.push(key, value, End::Left)
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<Value>> {
        Ok(self
            .read::<VecDeque<Value>, _>(key, |items| list::range(items, start, end))?
            .unwrap_or_default())
    }

    async fn ltrim(&self, key: &str, start: i64, end: i64) -> Result<bool> {
        self.update::<VecDeque<Value>, _>(key, false, |items| list::trim(items, start, end))?;
        Ok(true)
    }

    async fn rpop(&self, key: &str) -> Result<Option<Value>> {
        self.pop(key, End::Right)
    }

    async fn rpush(&self, key: &str, value: Value) -> Result<bool> {
        self.push(key, value, End::Right)
    }

    // ==================== Hash ====================

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Value>> {
        Ok(self
            .read::<HashMap<String, Value>, _>(key, Clone::clone)?
            .unwrap_or_default())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Value>> {
        Ok(self
            .read::<HashMap<String, Value>, _>(key, |hash| hash.get(field).cloned())?
            .flatten())
    }

    /// `Timeout::Default` leaves the hash's current expiry alone
    async fn hset(
        &self,
        key: &str,
        field: &str,
        value: Value,
        timeout: Timeout,
        _noreply: bool,
    ) -> Result<bool> {
        let deadline = match timeout {
            Timeout::Default => None,
            timeout => Some(self.deadline(timeout)),
        };
        self.update_with_expiry::<HashMap<String, Value>, _>(key, true, |hash, expires_at| {
            hash.insert(field.to_string(), value);
            if let Some(deadline) = deadline {
                *expires_at = deadline;
            }
        })?;
        Ok(true)
    }

    async fn hdel(&self, key: &str, field: &str, _noreply: bool) -> Result<bool> {
        self.update::<HashMap<String, Value>, _>(key, false, |hash| hash.remove(field))?;
        Ok(true)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self
            .read::<HashMap<String, Value>, _>(key, |hash| hash.contains_key(field))?
            .unwrap_or(false))
    }

    async fn hlen(&self, key: &str) -> Result<usize> {
        Ok(self
            .read::<HashMap<String, Value>, _>(key, HashMap::len)?
            .unwrap_or(0))
    }

    // ==================== Set ====================

    async fn sadd(&self, key: &str, value: Value) -> Result<bool> {
        self.update::<HashSet<Value>, _>(key, true, |set| set.insert(value))?;
        Ok(true)
    }

    async fn sadd_many(&self, key: &str, values: Vec<Value>) -> Result<bool> {
        self.update::<HashSet<Value>, _>(key, true, |set| set.extend(values))?;
        Ok(true)
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        Ok(self.read::<HashSet<Value>, _>(key, HashSet::len)?.unwrap_or(0))
    }

    async fn sismember(&self, key: &str, value: &[u8]) -> Result<bool> {
        Ok(self
            .read::<HashSet<Value>, _>(key, |set| set.contains(value))?
            .unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<Value>> {
        Ok(self
            .read::<HashSet<Value>, _>(key, Clone::clone)?
            .unwrap_or_default())
    }

    async fn srandmember(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .read::<HashSet<Value>, _>(key, |set| {
                set.iter().choose(&mut rand::thread_rng()).cloned()
            })?
            .flatten())
    }

    async fn srem(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.update::<HashSet<Value>, _>(key, false, |set| set.remove(value))?;
        Ok(true)
    }

    // ==================== Sorted set ====================

    async fn zadd(&self, key: &str, member: Value, score: f64) -> Result<bool> {
        self.update::<SortedSetValue, _>(key, true, |zset| zset.add(member, score))?;
        Ok(true)
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        Ok(self
            .read::<SortedSetValue, _>(key, SortedSetValue::len)?
            .unwrap_or(0))
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        Ok(self
            .read::<SortedSetValue, _>(key, |zset| zset.count(min, max))?
            .unwrap_or(0))
    }

    async fn zincrby(&self, key: &str, member: Value, delta: f64) -> Result<Option<f64>> {
        self.update::<SortedSetValue, _>(key, true, |zset| zset.incr_by(member, delta))
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>> {
        Ok(self
            .read::<SortedSetValue, _>(key, |zset| zset.range(start, end, reverse))?
            .unwrap_or_default())
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
        Ok(self
            .read::<SortedSetValue, _>(key, |zset| {
                zset.range_by_score(min, max, offset, count, reverse)
            })?
            .unwrap_or_default())
    }

    async fn zrank(&self, key: &str, member: &[u8], reverse: bool) -> Result<Option<usize>> {
        Ok(self
            .read::<SortedSetValue, _>(key, |zset| zset.rank(member, reverse))?
            .flatten())
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool> {
        self.update::<SortedSetValue, _>(key, false, |zset| zset.remove(member))?;
        Ok(true)
    }

    async fn zremrangebyrank(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<usize> {
        let (start, end) = if reverse {
            reverse_rank_range(start, end)
        } else {
            (start, end)
        };
        Ok(self
            .update::<SortedSetValue, _>(key, false, |zset| {
                zset.remove_range_by_rank(start, end)
            })?
            .unwrap_or(0))
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        Ok(self
            .update::<SortedSetValue, _>(key, false, |zset| {
                zset.remove_range_by_score(min, max)
            })?
            .unwrap_or(0))
    }

    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>> {
        Ok(self
            .read::<SortedSetValue, _>(key, |zset| zset.score(member))?
            .flatten())
    }

    /// Missing source keys count as empty sets
    async fn zunionstore(&self, dest: &str, keys: &[&str], aggregate: Aggregate) -> Result<usize> {
        let mut data = self.data.write();
        let now = Instant::now();

        let mut sources = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = live(&data, key, now) {
                let zset = SortedSetValue::from_data(&entry.data)
                    .ok_or_else(|| wrong_type(key, entry.data.kind(), SortedSetValue::KIND))?;
                sources.push(zset);
            }
        }
        let union = SortedSetValue::union(sources, aggregate);
        let len = union.len();

        if union.is_empty() {
            data.remove(dest);
        } else {
            data.insert(dest.to_string(), StoredValue::new(union.into_data(), None));
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MemoryCache {
        MemoryCache::new(MemoryConfig {
            timeout: 60,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = cache();
        assert!(cache.set("k", b"v".to_vec(), Timeout::Default, false).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(cache.delete("k", false).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let cache = cache();
        assert!(cache.set_if_absent("k", b"1".to_vec(), Timeout::Never, false).await.unwrap());
        assert!(!cache.set_if_absent("k", b"2".to_vec(), Timeout::Never, false).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_expired_key_is_gone() {
        let cache = cache();
        cache.set("k", b"v".to_vec(), Timeout::Seconds(1), false).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.expire("k", Timeout::Never).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_semantics() {
        let cache = cache();
        assert_eq!(cache.incr("n", 5, false).await.unwrap(), Some(5));
        assert_eq!(cache.incr("n", 2, false).await.unwrap(), Some(7));
        assert_eq!(cache.decr("n", 10, false).await.unwrap(), Some(-3));
        assert_eq!(cache.get("n").await.unwrap(), Some(b"-3".to_vec()));

        cache.set("s", b"abc".to_vec(), Timeout::Never, false).await.unwrap();
        assert_eq!(cache.incr("s", 1, false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let cache = cache();
        cache.lpush("l", b"x".to_vec()).await.unwrap();
        assert!(matches!(cache.get("l").await, Err(CacheError::WrongType(_))));
        assert!(matches!(cache.sadd("l", b"x".to_vec()).await, Err(CacheError::WrongType(_))));
        // Multi-get treats non-string keys as missing
        assert_eq!(cache.get_values(&["l"]).await.unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_list_ops() {
        let cache = cache();
        for item in ["b", "c"] {
            cache.rpush("l", item.as_bytes().to_vec()).await.unwrap();
        }
        cache.lpush("l", b"a".to_vec()).await.unwrap();

        assert_eq!(cache.llen("l").await.unwrap(), 3);
        assert_eq!(cache.lindex("l", -1).await.unwrap(), Some(b"c".to_vec()));
        assert_eq!(
            cache.lrange("l", 0, -1).await.unwrap(),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );

        cache.ltrim("l", 1, 1).await.unwrap();
        assert_eq!(cache.lrange("l", 0, -1).await.unwrap(), vec![b"b".to_vec()]);

        assert_eq!(cache.lpop("l").await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(cache.rpop("l").await.unwrap(), None);
        assert_eq!(cache.llen("l").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blocking_pop_wakes_on_push() {
        let cache = cache();
        let pusher = cache.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            pusher.rpush("jobs", b"job-1".to_vec()).await.unwrap();
        });

        let popped = cache.block_left_pop("jobs", 5).await.unwrap();
        assert_eq!(popped, Some(b"job-1".to_vec()));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_blocking_pop_times_out() {
        let cache = cache();
        let start = Instant::now();
        assert_eq!(cache.block_right_pop("empty", 1).await.unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_hash_ops() {
        let cache = cache();
        cache.hset("h", "a", b"1".to_vec(), Timeout::Default, false).await.unwrap();
        cache.hset("h", "b", b"2".to_vec(), Timeout::Default, false).await.unwrap();

        assert_eq!(cache.hget("h", "a").await.unwrap(), Some(b"1".to_vec()));
        assert!(cache.hexists("h", "b").await.unwrap());
        assert_eq!(cache.hlen("h").await.unwrap(), 2);

        cache.hdel("h", "a", false).await.unwrap();
        let all = cache.hgetall("h").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("b"), Some(&b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_set_ops() {
        let cache = cache();
        cache.sadd_many("s", vec![b"a".to_vec(), b"b".to_vec()]).await.unwrap();
        cache.sadd("s", b"a".to_vec()).await.unwrap();

        assert_eq!(cache.scard("s").await.unwrap(), 2);
        assert!(cache.sismember("s", b"a").await.unwrap());
        let member = cache.srandmember("s").await.unwrap().unwrap();
        assert!(member == b"a" || member == b"b");

        cache.srem("s", b"a").await.unwrap();
        assert_eq!(
            cache.smembers("s").await.unwrap(),
            HashSet::from([b"b".to_vec()])
        );
    }

    #[tokio::test]
    async fn test_sorted_set_ops() {
        let cache = cache();
        for (member, score) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            cache.zadd("z", member.as_bytes().to_vec(), score).await.unwrap();
        }

        assert_eq!(cache.zcard("z").await.unwrap(), 4);
        assert_eq!(cache.zcount("z", 2.0, 3.0).await.unwrap(), 2);
        assert_eq!(cache.zincrby("z", b"a".to_vec(), 10.0).await.unwrap(), Some(11.0));
        assert_eq!(cache.zrank("z", b"a", false).await.unwrap(), Some(3));
        assert_eq!(cache.zrank("z", b"a", true).await.unwrap(), Some(0));
        assert_eq!(cache.zscore("z", b"b").await.unwrap(), Some(2.0));

        let top = cache.zrange("z", 0, 0, true).await.unwrap();
        assert_eq!(top, vec![ScoredMember::new(b"a".to_vec(), 11.0)]);

        // Reverse rank 0..=0 is the highest score
        assert_eq!(cache.zremrangebyrank("z", 0, 0, true).await.unwrap(), 1);
        assert_eq!(cache.zscore("z", b"a").await.unwrap(), None);

        assert_eq!(cache.zremrangebyscore("z", 2.0, 3.0).await.unwrap(), 2);
        assert_eq!(
            cache.zrangebyscore("z", 0.0, 10.0, None, None, false).await.unwrap(),
            vec![ScoredMember::new(b"d".to_vec(), 4.0)]
        );
    }

    #[tokio::test]
    async fn test_zunionstore() {
        let cache = cache();
        cache.zadd("a", b"x".to_vec(), 1.0).await.unwrap();
        cache.zadd("a", b"y".to_vec(), 2.0).await.unwrap();
        cache.zadd("b", b"y".to_vec(), 3.0).await.unwrap();

        let size = cache
            .zunionstore("dest", &["a", "b", "missing"], Aggregate::Sum)
            .await
            .unwrap();
        assert_eq!(size, 2);
        assert_eq!(cache.zscore("dest", b"y").await.unwrap(), Some(5.0));

        let size = cache
            .zunionstore("dest", &["a", "b"], Aggregate::Max)
            .await
            .unwrap();
        assert_eq!(size, 2);
        assert_eq!(cache.zscore("dest", b"y").await.unwrap(), Some(3.0));
    }

    #[tokio::test]
    async fn test_clear_and_cleanup() {
        let cache = cache();
        cache.set("a", b"1".to_vec(), Timeout::Never, false).await.unwrap();
        cache.set("b", b"2".to_vec(), Timeout::Seconds(1), false).await.unwrap();
        cache.set("c", b"3".to_vec(), Timeout::Seconds(0), false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("c").await.unwrap(), Some(b"3".to_vec()));

        assert!(cache.clear().await.unwrap());
        assert!(cache.is_empty());
    }
}

//! Redis backend
//!
//! Every contract operation maps to one Redis command (or a pipeline for the
//! multi-key writes) over a lazily opened multiplexed connection. Blocking
//! pops use their own connection so they never stall the shared one.

use crate::config::RedisConfig;
use crate::core::{Aggregate, CacheClient, Result, ScoredMember, Timeout, Value};
use crate::core::types::reverse_rank_range;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Cmd};
use std::collections::{HashMap, HashSet};
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub struct RedisCache {
    client: Client,
    conn: OnceCell<MultiplexedConnection>,
    prefix: String,
    default_timeout: u64,
    scan_count: usize,
}

impl RedisCache {
    /// Validate the connection settings; the connection opens on first use
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.connection_url())?;
        info!(
            "Redis cache configured for {}:{} (db={}, prefix='{}')",
            config.host, config.port, config.db, config.prefix
        );

        Ok(Self {
            client,
            conn: OnceCell::new(),
            prefix: config.prefix.clone(),
            default_timeout: config.timeout,
            scan_count: config.scan_count,
        })
    }

    async fn conn(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?;
        Ok(conn.clone())
    }

    fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        let mut conn = self.conn().await?;
        Ok(cmd.query_async(&mut conn).await?)
    }

    /// `SET key value [NX] [EX secs]`
    fn set_cmd(&self, key: &str, value: Value, timeout: Timeout, only_if_absent: bool) -> Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value);
        if only_if_absent {
            cmd.arg("NX");
        }
        if let Some(secs) = timeout.resolve_secs(self.default_timeout) {
            cmd.arg("EX").arg(secs);
        }
        cmd
    }

    async fn block_pop(&self, command: &str, key: &str, timeout: u64) -> Result<Option<Value>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let popped: Option<(String, Value)> = redis::cmd(command)
            .arg(self.key(key))
            .arg(timeout)
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn clear_prefix(&self) -> Result<bool> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let deleted: usize = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("Cleared {} keys under prefix '{}'", removed, self.prefix);
        Ok(true)
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.query(redis::cmd("GET").arg(self.key(key))).await
    }

    async fn get_values(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        self.query(redis::cmd("MGET").arg(keys)).await
    }

    async fn get_key_to_value(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let values = self.get_values(keys).await?;
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
            .collect())
    }

    async fn set(&self, key: &str, value: Value, timeout: Timeout, _noreply: bool) -> Result<bool> {
        let _: () = self.query(&self.set_cmd(key, value, timeout, false)).await?;
        Ok(true)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        timeout: Timeout,
        _noreply: bool,
    ) -> Result<bool> {
        let reply: Option<String> = self.query(&self.set_cmd(key, value, timeout, true)).await?;
        Ok(reply.is_some())
    }

    async fn set_many(
        &self,
        pairs: Vec<(String, Value)>,
        timeout: Timeout,
        _noreply: bool,
    ) -> Result<bool> {
        let mut pipe = redis::pipe();
        for (key, value) in pairs {
            pipe.add_command(self.set_cmd(&key, value, timeout, false)).ignore();
        }
        let mut conn = self.conn().await?;
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(true)
    }

    async fn delete(&self, key: &str, _noreply: bool) -> Result<bool> {
        let _: usize = self.query(redis::cmd("DEL").arg(self.key(key))).await?;
        Ok(true)
    }

    async fn delete_many(&self, keys: &[&str], _noreply: bool) -> Result<bool> {
        if keys.is_empty() {
            return Ok(true);
        }
        let keys: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        let _: usize = self.query(redis::cmd("DEL").arg(keys)).await?;
        Ok(true)
    }

    async fn incr(&self, key: &str, delta: i64, _noreply: bool) -> Result<Option<i64>> {
        let value: i64 = self
            .query(redis::cmd("INCRBY").arg(self.key(key)).arg(delta))
            .await?;
        Ok(Some(value))
    }

    async fn clear(&self) -> Result<bool> {
        if !self.prefix.is_empty() {
            return self.clear_prefix().await;
        }
        let _: () = self.query(&redis::cmd("FLUSHDB")).await?;
        Ok(true)
    }

    async fn expire(&self, key: &str, timeout: Timeout) -> Result<bool> {
        match timeout.resolve_secs(self.default_timeout) {
            Some(secs) => {
                self.query(redis::cmd("EXPIRE").arg(self.key(key)).arg(secs))
                    .await
            }
            None => {
                let exists: bool = self.query(redis::cmd("EXISTS").arg(self.key(key))).await?;
                if exists {
                    let _: bool = self.query(redis::cmd("PERSIST").arg(self.key(key))).await?;
                }
                Ok(exists)
            }
        }
    }

    // ==================== List ====================

    async fn block_left_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.block_pop("BLPOP", key, timeout).await
    }

    async fn block_right_pop(&self, key: &str, timeout: u64) -> Result<Option<Value>> {
        self.block_pop("BRPOP", key, timeout).await
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<Value>> {
        self.query(redis::cmd("LINDEX").arg(self.key(key)).arg(index))
            .await
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        self.query(redis::cmd("LLEN").arg(self.key(key))).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<Value>> {
        self.query(redis::cmd("LPOP").arg(self.key(key))).await
    }

    async fn lpush(&self, key: &str, value: Value) -> Result<bool> {
        let _: usize = self
            .query(redis::cmd("LPUSH").arg(self.key(key)).arg(value))
            .await?;
        Ok(true)
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<Value>> {
        self.query(redis::cmd("LRANGE").arg(self.key(key)).arg(start).arg(end))
            .await
    }

    async fn ltrim(&self, key: &str, start: i64, end: i64) -> Result<bool> {
        let _: () = self
            .query(redis::cmd("LTRIM").arg(self.key(key)).arg(start).arg(end))
            .await?;
        Ok(true)
    }

    async fn rpop(&self, key: &str) -> Result<Option<Value>> {
        self.query(redis::cmd("RPOP").arg(self.key(key))).await
    }

    async fn rpush(&self, key: &str, value: Value) -> Result<bool> {
        let _: usize = self
            .query(redis::cmd("RPUSH").arg(self.key(key)).arg(value))
            .await?;
        Ok(true)
    }

    // ==================== Hash ====================

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Value>> {
        self.query(redis::cmd("HGETALL").arg(self.key(key))).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Value>> {
        self.query(redis::cmd("HGET").arg(self.key(key)).arg(field))
            .await
    }

    async fn hset(
        &self,
        key: &str,
        field: &str,
        value: Value,
        timeout: Timeout,
        _noreply: bool,
    ) -> Result<bool> {
        let full_key = self.key(key);
        let _: usize = self
            .query(redis::cmd("HSET").arg(&full_key).arg(field).arg(value))
            .await?;
        if timeout == Timeout::Default {
            return Ok(true);
        }
        match timeout.resolve_secs(self.default_timeout) {
            Some(secs) => {
                let _: bool = self
                    .query(redis::cmd("EXPIRE").arg(&full_key).arg(secs))
                    .await?;
            }
            None => {
                let _: bool = self.query(redis::cmd("PERSIST").arg(&full_key)).await?;
            }
        }
        Ok(true)
    }

    async fn hdel(&self, key: &str, field: &str, _noreply: bool) -> Result<bool> {
        let _: usize = self
            .query(redis::cmd("HDEL").arg(self.key(key)).arg(field))
            .await?;
        Ok(true)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.query(redis::cmd("HEXISTS").arg(self.key(key)).arg(field))
            .await
    }

    async fn hlen(&self, key: &str) -> Result<usize> {
        self.query(redis::cmd("HLEN").arg(self.key(key))).await
    }

    // ==================== Set ====================

    async fn sadd(&self, key: &str, value: Value) -> Result<bool> {
        let _: usize = self
            .query(redis::cmd("SADD").arg(self.key(key)).arg(value))
            .await?;
        Ok(true)
    }

    async fn sadd_many(&self, key: &str, values: Vec<Value>) -> Result<bool> {
        if values.is_empty() {
            return Ok(true);
        }
        let _: usize = self
            .query(redis::cmd("SADD").arg(self.key(key)).arg(values))
            .await?;
        Ok(true)
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        self.query(redis::cmd("SCARD").arg(self.key(key))).await
    }

    async fn sismember(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.query(redis::cmd("SISMEMBER").arg(self.key(key)).arg(value))
            .await
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<Value>> {
        self.query(redis::cmd("SMEMBERS").arg(self.key(key))).await
    }

    async fn srandmember(&self, key: &str) -> Result<Option<Value>> {
        self.query(redis::cmd("SRANDMEMBER").arg(self.key(key))).await
    }

    async fn srem(&self, key: &str, value: &[u8]) -> Result<bool> {
        let _: usize = self
            .query(redis::cmd("SREM").arg(self.key(key)).arg(value))
            .await?;
        Ok(true)
    }

    // ==================== Sorted set ====================

    async fn zadd(&self, key: &str, member: Value, score: f64) -> Result<bool> {
        let _: usize = self
            .query(redis::cmd("ZADD").arg(self.key(key)).arg(score).arg(member))
            .await?;
        Ok(true)
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        self.query(redis::cmd("ZCARD").arg(self.key(key))).await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.query(redis::cmd("ZCOUNT").arg(self.key(key)).arg(min).arg(max))
            .await
    }

    async fn zincrby(&self, key: &str, member: Value, delta: f64) -> Result<Option<f64>> {
        let score: f64 = self
            .query(redis::cmd("ZINCRBY").arg(self.key(key)).arg(delta).arg(member))
            .await?;
        Ok(Some(score))
    }

    async fn zrange(
        &self,
        key: &str,
        start: i64,
        end: i64,
        reverse: bool,
    ) -> Result<Vec<ScoredMember>> {
        let command = if reverse { "ZREVRANGE" } else { "ZRANGE" };
        let pairs: Vec<(Value, f64)> = self
            .query(
                redis::cmd(command)
                    .arg(self.key(key))
                    .arg(start)
                    .arg(end)
                    .arg("WITHSCORES"),
            )
            .await?;
        Ok(to_scored(pairs))
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
        let mut cmd = if reverse {
            let mut cmd = redis::cmd("ZREVRANGEBYSCORE");
            cmd.arg(self.key(key)).arg(max).arg(min);
            cmd
        } else {
            let mut cmd = redis::cmd("ZRANGEBYSCORE");
            cmd.arg(self.key(key)).arg(min).arg(max);
            cmd
        };
        cmd.arg("WITHSCORES");
        if offset.is_some() || count.is_some() {
            let count = count.map_or(-1, |count| count as i64);
            cmd.arg("LIMIT").arg(offset.unwrap_or(0)).arg(count);
        }

        let pairs: Vec<(Value, f64)> = self.query(&cmd).await?;
        Ok(to_scored(pairs))
    }

    async fn zrank(&self, key: &str, member: &[u8], reverse: bool) -> Result<Option<usize>> {
        let command = if reverse { "ZREVRANK" } else { "ZRANK" };
        self.query(redis::cmd(command).arg(self.key(key)).arg(member))
            .await
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool> {
        let _: usize = self
            .query(redis::cmd("ZREM").arg(self.key(key)).arg(member))
            .await?;
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
        self.query(
            redis::cmd("ZREMRANGEBYRANK")
                .arg(self.key(key))
                .arg(start)
                .arg(end),
        )
        .await
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.query(
            redis::cmd("ZREMRANGEBYSCORE")
                .arg(self.key(key))
                .arg(min)
                .arg(max),
        )
        .await
    }

    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>> {
        self.query(redis::cmd("ZSCORE").arg(self.key(key)).arg(member))
            .await
    }

    async fn zunionstore(&self, dest: &str, keys: &[&str], aggregate: Aggregate) -> Result<usize> {
        let keys: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        self.query(
            redis::cmd("ZUNIONSTORE")
                .arg(self.key(dest))
                .arg(keys.len())
                .arg(keys)
                .arg("AGGREGATE")
                .arg(aggregate.as_str()),
        )
        .await
    }
}

fn to_scored(pairs: Vec<(Value, f64)>) -> Vec<ScoredMember> {
    pairs
        .into_iter()
        .map(|(member, score)| ScoredMember::new(member, score))
        .collect()
}

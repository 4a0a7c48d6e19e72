use anyhow::{Context, Result, anyhow};
use cachemux_core::{
    CacheClient, CacheConfig, CacheRegistry, DistributionCache, ScoredMember, Timeout, Value,
};
use colored::Colorize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Id given to the top-level cache of a topology
pub const ROOT_ID: &str = "root";

/// A topology built from configuration, ready to run commands against
pub struct Session {
    cache: Arc<dyn CacheClient>,
    distribution: Option<Arc<DistributionCache>>,
    config: CacheConfig,
}

impl Session {
    pub fn build(registry: &CacheRegistry, config: CacheConfig) -> Result<Self> {
        let (cache, distribution) = if config.cache_type == "distribution" {
            let distribution = Arc::new(
                DistributionCache::from_config(ROOT_ID, &config, registry)
                    .context("Failed to build distribution cache")?,
            );
            let cache: Arc<dyn CacheClient> = distribution.clone();
            (cache, Some(distribution))
        } else {
            let cache = registry
                .create(ROOT_ID, &config)
                .with_context(|| format!("Failed to build '{}' cache", config.cache_type))?;
            (cache, None)
        };

        Ok(Self {
            cache,
            distribution,
            config,
        })
    }

    pub fn cache_type(&self) -> &str {
        &self.config.cache_type
    }

    pub async fn execute_command(&self, command: &str, args: &[String]) -> Result<String> {
        let start = Instant::now();
        let response = self.dispatch(command, args).await?;
        let elapsed = start.elapsed();
        Ok(format!(
            "{}\n{}",
            response,
            format!("({:.2?})", elapsed).dimmed()
        ))
    }

    async fn dispatch(&self, command: &str, args: &[String]) -> Result<String> {
        let cache = self.cache.as_ref();
        match command.to_uppercase().as_str() {
            // Scalar
            "SET" => {
                let usage = "SET key value [ttl]";
                let (key, value) = (arg(args, 0, usage)?, arg(args, 1, usage)?);
                Ok(ok(cache.set(key, bytes(value), ttl(args.get(2))?, false).await?))
            }
            "SETNX" => {
                let usage = "SETNX key value [ttl]";
                let (key, value) = (arg(args, 0, usage)?, arg(args, 1, usage)?);
                Ok(ok(cache
                    .set_if_absent(key, bytes(value), ttl(args.get(2))?, false)
                    .await?))
            }
            "GET" => Ok(value(cache.get(arg(args, 0, "GET key")?).await?)),
            "MGET" => {
                if args.is_empty() {
                    return Err(anyhow!("Usage: MGET key [key ...]"));
                }
                let keys: Vec<&str> = args.iter().map(String::as_str).collect();
                Ok(numbered(cache.get_values(&keys).await?.into_iter().map(value)))
            }
            "MSET" => {
                if args.is_empty() || args.len() % 2 != 0 {
                    return Err(anyhow!("Usage: MSET k1 v1 [k2 v2 ...]"));
                }
                let pairs = args
                    .chunks(2)
                    .map(|pair| (pair[0].clone(), bytes(&pair[1])))
                    .collect();
                Ok(ok(cache.set_many(pairs, Timeout::Default, false).await?))
            }
            "DEL" | "DELETE" => {
                let keys: Vec<&str> = args.iter().map(String::as_str).collect();
                match keys.as_slice() {
                    [] => Err(anyhow!("Usage: DEL key [key ...]")),
                    [key] => Ok(ok(cache.delete(key, false).await?)),
                    keys => Ok(ok(cache.delete_many(keys, false).await?)),
                }
            }
            "INCR" => {
                let key = arg(args, 0, "INCR key [amount]")?;
                let delta = optional(args.get(1), 1, "amount")?;
                Ok(integer(cache.incr(key, delta, false).await?))
            }
            "DECR" => {
                let key = arg(args, 0, "DECR key [amount]")?;
                let delta = optional(args.get(1), 1, "amount")?;
                Ok(integer(cache.decr(key, delta, false).await?))
            }
            "EXPIRE" => {
                let usage = "EXPIRE key seconds";
                let key = arg(args, 0, usage)?;
                let seconds: u64 = parse(arg(args, 1, usage)?, "seconds")?;
                Ok(ok(cache.expire(key, Timeout::from_secs(seconds)).await?))
            }
            "FLUSHDB" => Ok(ok(cache.clear().await?)),

            // List
            "LPUSH" | "RPUSH" => {
                let usage = "LPUSH|RPUSH key value [value ...]";
                let key = arg(args, 0, usage)?;
                arg(args, 1, usage)?;
                let mut pushed = true;
                for item in &args[1..] {
                    let stored = if command.eq_ignore_ascii_case("LPUSH") {
                        cache.lpush(key, bytes(item)).await?
                    } else {
                        cache.rpush(key, bytes(item)).await?
                    };
                    pushed &= stored;
                }
                Ok(ok(pushed))
            }
            "LPOP" => Ok(value(cache.lpop(arg(args, 0, "LPOP key")?).await?)),
            "RPOP" => Ok(value(cache.rpop(arg(args, 0, "RPOP key")?).await?)),
            "BLPOP" | "BRPOP" => {
                let key = arg(args, 0, "BLPOP|BRPOP key [timeout]")?;
                let timeout = optional(args.get(1), 0, "timeout")?;
                let popped = if command.eq_ignore_ascii_case("BLPOP") {
                    cache.block_left_pop(key, timeout).await?
                } else {
                    cache.block_right_pop(key, timeout).await?
                };
                Ok(value(popped))
            }
            "LLEN" => Ok(count(cache.llen(arg(args, 0, "LLEN key")?).await?)),
            "LINDEX" => {
                let usage = "LINDEX key index";
                let index = parse(arg(args, 1, usage)?, "index")?;
                Ok(value(cache.lindex(arg(args, 0, usage)?, index).await?))
            }
            "LRANGE" => {
                let usage = "LRANGE key start end";
                let start = parse(arg(args, 1, usage)?, "start")?;
                let end = parse(arg(args, 2, usage)?, "end")?;
                let items = cache.lrange(arg(args, 0, usage)?, start, end).await?;
                Ok(numbered(items.into_iter().map(|item| value(Some(item)))))
            }
            "LTRIM" => {
                let usage = "LTRIM key start end";
                let start = parse(arg(args, 1, usage)?, "start")?;
                let end = parse(arg(args, 2, usage)?, "end")?;
                Ok(ok(cache.ltrim(arg(args, 0, usage)?, start, end).await?))
            }

            // Hash
            "HSET" => {
                let usage = "HSET key field value [ttl]";
                let (key, field, item) = (
                    arg(args, 0, usage)?,
                    arg(args, 1, usage)?,
                    arg(args, 2, usage)?,
                );
                Ok(ok(cache
                    .hset(key, field, bytes(item), ttl(args.get(3))?, false)
                    .await?))
            }
            "HGET" => {
                let usage = "HGET key field";
                Ok(value(cache.hget(arg(args, 0, usage)?, arg(args, 1, usage)?).await?))
            }
            "HDEL" => {
                let usage = "HDEL key field";
                Ok(ok(cache
                    .hdel(arg(args, 0, usage)?, arg(args, 1, usage)?, false)
                    .await?))
            }
            "HGETALL" => {
                let mut fields: Vec<(String, Value)> =
                    cache.hgetall(arg(args, 0, "HGETALL key")?).await?.into_iter().collect();
                fields.sort();
                Ok(numbered(fields.into_iter().map(|(field, item)| {
                    format!("{} => {}", field, value(Some(item)))
                })))
            }
            "HLEN" => Ok(count(cache.hlen(arg(args, 0, "HLEN key")?).await?)),

            // Set
            "SADD" => {
                let usage = "SADD key member [member ...]";
                let key = arg(args, 0, usage)?;
                arg(args, 1, usage)?;
                let members = args[1..].iter().map(|member| bytes(member)).collect();
                Ok(ok(cache.sadd_many(key, members).await?))
            }
            "SREM" => {
                let usage = "SREM key member";
                Ok(ok(cache
                    .srem(arg(args, 0, usage)?, arg(args, 1, usage)?.as_bytes())
                    .await?))
            }
            "SMEMBERS" => {
                let mut members: Vec<Value> =
                    cache.smembers(arg(args, 0, "SMEMBERS key")?).await?.into_iter().collect();
                members.sort();
                Ok(numbered(members.into_iter().map(|member| value(Some(member)))))
            }
            "SISMEMBER" => {
                let usage = "SISMEMBER key member";
                let found = cache
                    .sismember(arg(args, 0, usage)?, arg(args, 1, usage)?.as_bytes())
                    .await?;
                Ok(format!("(integer) {}", u8::from(found)))
            }
            "SCARD" => Ok(count(cache.scard(arg(args, 0, "SCARD key")?).await?)),

            // Sorted set
            "ZADD" => {
                let usage = "ZADD key score member";
                let score = parse(arg(args, 1, usage)?, "score")?;
                Ok(ok(cache
                    .zadd(arg(args, 0, usage)?, bytes(arg(args, 2, usage)?), score)
                    .await?))
            }
            "ZINCRBY" => {
                let usage = "ZINCRBY key delta member";
                let delta = parse(arg(args, 1, usage)?, "delta")?;
                let score = cache
                    .zincrby(arg(args, 0, usage)?, bytes(arg(args, 2, usage)?), delta)
                    .await?;
                Ok(score.map_or_else(nil, |score| format!("\"{}\"", score)))
            }
            "ZSCORE" => {
                let usage = "ZSCORE key member";
                let score = cache
                    .zscore(arg(args, 0, usage)?, arg(args, 1, usage)?.as_bytes())
                    .await?;
                Ok(score.map_or_else(nil, |score| format!("\"{}\"", score)))
            }
            "ZRANGE" | "ZREVRANGE" => {
                let usage = "ZRANGE key start end";
                let start = parse(arg(args, 1, usage)?, "start")?;
                let end = parse(arg(args, 2, usage)?, "end")?;
                let reverse = command.eq_ignore_ascii_case("ZREVRANGE");
                let members = cache.zrange(arg(args, 0, usage)?, start, end, reverse).await?;
                Ok(scored(members))
            }
            "ZRANGEBYSCORE" => {
                let usage = "ZRANGEBYSCORE key min max";
                let min = parse(arg(args, 1, usage)?, "min")?;
                let max = parse(arg(args, 2, usage)?, "max")?;
                let members = cache
                    .zrangebyscore(arg(args, 0, usage)?, min, max, None, None, false)
                    .await?;
                Ok(scored(members))
            }
            "ZREM" => {
                let usage = "ZREM key member";
                Ok(ok(cache
                    .zrem(arg(args, 0, usage)?, arg(args, 1, usage)?.as_bytes())
                    .await?))
            }
            "ZCARD" => Ok(count(cache.zcard(arg(args, 0, "ZCARD key")?).await?)),

            // Topology
            "ROUTE" => {
                let key = arg(args, 0, "ROUTE key")?;
                let distribution = self.distribution.as_ref().ok_or_else(|| {
                    anyhow!(
                        "ROUTE needs a distribution cache at the top level, got '{}'",
                        self.config.cache_type
                    )
                })?;
                Ok(distribution
                    .route(key)
                    .map_or_else(nil, |child| format!("\"{}\"", child)))
            }
            "TOPOLOGY" => Ok(serde_json::to_string_pretty(&self.config)?),
            "HELP" => Ok(help_text()),
            _ => Err(anyhow!("Unknown command: {}", command)),
        }
    }
}

fn arg<'a>(args: &'a [String], index: usize, usage: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Usage: {}", usage))
}

fn parse<T: FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| anyhow!("Invalid {}: '{}'", what, raw))
}

fn optional<T: FromStr>(raw: Option<&String>, default: T, what: &str) -> Result<T> {
    raw.map_or(Ok(default), |raw| parse(raw, what))
}

/// Missing means the backend default, `0` means never expire
fn ttl(raw: Option<&String>) -> Result<Timeout> {
    let seconds: Option<u64> = raw.map(|raw| parse(raw, "ttl")).transpose()?;
    Ok(Timeout::from(seconds))
}

fn bytes(text: &str) -> Value {
    text.as_bytes().to_vec()
}

fn nil() -> String {
    "(nil)".dimmed().to_string()
}

fn ok(success: bool) -> String {
    if success {
        "OK".green().to_string()
    } else {
        "FAILED".red().to_string()
    }
}

fn value(item: Option<Value>) -> String {
    match item {
        Some(item) => format!("\"{}\"", String::from_utf8_lossy(&item)),
        None => nil(),
    }
}

fn integer(result: Option<i64>) -> String {
    result.map_or_else(nil, |n| format!("(integer) {}", n))
}

fn count(n: usize) -> String {
    format!("(integer) {}", n)
}

fn numbered(lines: impl Iterator<Item = String>) -> String {
    let output = lines
        .enumerate()
        .map(|(i, line)| format!("{}) {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n");
    if output.is_empty() {
        "(empty list)".dimmed().to_string()
    } else {
        output
    }
}

fn scored(members: Vec<ScoredMember>) -> String {
    numbered(members.into_iter().map(|entry| {
        format!("{} ({})", value(Some(entry.member)), entry.score)
    }))
}

fn help_text() -> String {
    format!(
        r#"{}

{}
  SET key value [ttl]        Set key (ttl 0 = never expire)
  SETNX key value [ttl]      Set key only if absent
  GET key                    Get the value of key
  MSET k1 v1 [k2 v2 ...]     Set multiple keys
  MGET key [key ...]         Get values of multiple keys
  DEL key [key ...]          Delete one or more keys
  INCR key [amount]          Increment value by amount (default 1)
  DECR key [amount]          Decrement value by amount (default 1)
  EXPIRE key seconds         Reset the timeout of key
  FLUSHDB                    Clear every cache in the topology

{}
  LPUSH|RPUSH key value ...  Push values
  LPOP|RPOP key              Pop a value
  BLPOP|BRPOP key [timeout]  Blocking pop (timeout 0 = wait forever)
  LLEN key / LINDEX key i    Length / element at index
  LRANGE key start end       Inclusive slice
  LTRIM key start end        Keep only the inclusive slice

{}
  HSET key field value [ttl] / HGET key field / HDEL key field
  HGETALL key / HLEN key

{}
  SADD key member ... / SREM key member / SMEMBERS key
  SISMEMBER key member / SCARD key

{}
  ZADD key score member / ZINCRBY key delta member / ZSCORE key member
  ZRANGE|ZREVRANGE key start end / ZRANGEBYSCORE key min max
  ZREM key member / ZCARD key

{}
  ROUTE key                  Child owning key (distribution only)
  TOPOLOGY                   Print the loaded configuration
  HELP                       Show this help message
  QUIT                       Exit the CLI
"#,
        "cachemux CLI - Available Commands".bold().cyan(),
        "Key/Value:".bold(),
        "Lists:".bold(),
        "Hashes:".bold(),
        "Sets:".bold(),
        "Sorted Sets:".bold(),
        "Topology:".bold(),
    )
}

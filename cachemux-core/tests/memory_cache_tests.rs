// In-process backend tests
// Expiration, index semantics, sorted-set queries and blocking pops

use cachemux_core::config::MemoryConfig;
use cachemux_core::{CacheClient, CacheError, MemoryCache, ScoredMember, Timeout};
use std::sync::Arc;
use std::time::Duration;

fn cache() -> MemoryCache {
    MemoryCache::new(MemoryConfig {
        timeout: 0,
        ..Default::default()
    })
}

// ==================== Expiration ====================

#[tokio::test]
async fn test_default_timeout_applies_to_unspecified_writes() {
    let cache = MemoryCache::new(MemoryConfig {
        timeout: 1,
        ..Default::default()
    });

    cache.set("short", b"v".to_vec(), Timeout::Default, false).await.unwrap();
    cache.set("forever", b"v".to_vec(), Timeout::Never, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(cache.get("short").await.unwrap(), None);
    assert_eq!(cache.get("forever").await.unwrap(), Some(b"v".to_vec()));
}

#[tokio::test]
async fn test_expire_on_missing_key_is_false() {
    let cache = cache();
    assert!(!cache.expire("nope", Timeout::Seconds(10)).await.unwrap());

    cache.set("k", b"v".to_vec(), Timeout::Never, false).await.unwrap();
    assert!(cache.expire("k", Timeout::Seconds(1)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(cache.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_background_cleanup_removes_expired_entries() {
    let cache = MemoryCache::default();
    cache.set("k", b"v".to_vec(), Timeout::Seconds(1), false).await.unwrap();
    let handle = cache.start_ttl_cleanup(Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(cache.cleanup_expired(), 0);
    assert!(cache.is_empty());
    handle.abort();
}

#[tokio::test]
async fn test_incr_keeps_existing_expiry() {
    let cache = cache();
    cache.set("n", b"1".to_vec(), Timeout::Seconds(1), false).await.unwrap();
    assert_eq!(cache.incr("n", 1, false).await.unwrap(), Some(2));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(cache.get("n").await.unwrap(), None);
    assert_eq!(cache.incr("n", 1, false).await.unwrap(), Some(1));
}

// ==================== Lists ====================

#[tokio::test]
async fn test_negative_indices_and_inclusive_ranges() {
    let cache = cache();
    for item in ["a", "b", "c", "d"] {
        cache.rpush("l", item.as_bytes().to_vec()).await.unwrap();
    }

    assert_eq!(cache.lindex("l", -1).await.unwrap(), Some(b"d".to_vec()));
    assert_eq!(cache.lindex("l", -5).await.unwrap(), None);
    assert_eq!(
        cache.lrange("l", -2, 100).await.unwrap(),
        vec![b"c".to_vec(), b"d".to_vec()]
    );

    assert!(cache.ltrim("l", 3, 1).await.unwrap());
    assert_eq!(cache.llen("l").await.unwrap(), 0);
}

#[tokio::test]
async fn test_blocking_pop_without_timeout_waits_for_push() {
    let cache = Arc::new(cache());
    let waiter = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.block_right_pop("jobs", 0).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cache.lpush("jobs", b"first".to_vec()).await.unwrap();

    let popped = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(popped, Some(b"first".to_vec()));
    assert_eq!(cache.llen("jobs").await.unwrap(), 0);
}

// ==================== Sorted sets ====================

async fn leaderboard() -> MemoryCache {
    let cache = cache();
    for (member, score) in [("alice", 10.0), ("bob", 20.0), ("carol", 30.0), ("dave", 40.0)] {
        cache
            .zadd("board", member.as_bytes().to_vec(), score)
            .await
            .unwrap();
    }
    cache
}

#[tokio::test]
async fn test_zrangebyscore_paging_and_reverse() {
    let cache = leaderboard().await;

    let page = cache
        .zrangebyscore("board", 15.0, 45.0, Some(1), Some(2), false)
        .await
        .unwrap();
    assert_eq!(
        page,
        vec![ScoredMember::new("carol", 30.0), ScoredMember::new("dave", 40.0)]
    );

    let reversed = cache
        .zrangebyscore("board", 0.0, 25.0, None, None, true)
        .await
        .unwrap();
    assert_eq!(
        reversed,
        vec![ScoredMember::new("bob", 20.0), ScoredMember::new("alice", 10.0)]
    );
}

#[tokio::test]
async fn test_reverse_rank_operations() {
    let cache = leaderboard().await;

    assert_eq!(cache.zrank("board", b"dave", true).await.unwrap(), Some(0));
    assert_eq!(cache.zrank("board", b"dave", false).await.unwrap(), Some(3));

    // top two by reverse rank
    assert_eq!(cache.zremrangebyrank("board", 0, 1, true).await.unwrap(), 2);
    assert_eq!(
        cache.zrange("board", 0, -1, false).await.unwrap(),
        vec![ScoredMember::new("alice", 10.0), ScoredMember::new("bob", 20.0)]
    );
}

#[tokio::test]
async fn test_reverse_rank_removal_accepts_extreme_indices() {
    let cache = leaderboard().await;

    assert_eq!(cache.zremrangebyrank("board", 0, i64::MIN, true).await.unwrap(), 0);
    assert_eq!(cache.zcard("board").await.unwrap(), 4);

    assert_eq!(
        cache
            .zremrangebyrank("board", i64::MIN, i64::MAX, true)
            .await
            .unwrap(),
        4
    );
    assert_eq!(cache.zcard("board").await.unwrap(), 0);
}

#[tokio::test]
async fn test_zremrangebyscore_is_inclusive() {
    let cache = leaderboard().await;
    assert_eq!(cache.zremrangebyscore("board", 20.0, 30.0).await.unwrap(), 2);
    assert_eq!(cache.zcount("board", f64::NEG_INFINITY, f64::INFINITY).await.unwrap(), 2);
}

#[tokio::test]
async fn test_zincrby_creates_member() {
    let cache = cache();
    assert_eq!(cache.zincrby("z", b"m".to_vec(), 2.5).await.unwrap(), Some(2.5));
    assert_eq!(cache.zincrby("z", b"m".to_vec(), -1.0).await.unwrap(), Some(1.5));
}

// ==================== Type safety ====================

#[tokio::test]
async fn test_collection_ops_on_string_key_fail() {
    let cache = cache();
    cache.set("k", b"v".to_vec(), Timeout::Never, false).await.unwrap();

    assert!(matches!(
        cache.zadd("k", b"m".to_vec(), 1.0).await,
        Err(CacheError::WrongType(_))
    ));
    assert!(matches!(cache.hgetall("k").await, Err(CacheError::WrongType(_))));

    // a plain set replaces a collection
    cache.sadd("s", b"x".to_vec()).await.unwrap();
    cache.set("s", b"v".to_vec(), Timeout::Never, false).await.unwrap();
    assert_eq!(cache.get("s").await.unwrap(), Some(b"v".to_vec()));
}

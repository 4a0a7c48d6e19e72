// Property tests for key routing

use cachemux_core::{HashMethod, HashRing, RoutingMethod, RoutingStrategy, ShardId};
use proptest::prelude::*;

fn hash_method() -> impl Strategy<Value = HashMethod> {
    prop_oneof![Just(HashMethod::Crc32), Just(HashMethod::Md5)]
}

fn ring(method: HashMethod, nodes: &[&str]) -> HashRing {
    HashRing::from_nodes(method, nodes.iter().map(|name| (*name, 16)))
}

proptest! {
    #[test]
    fn test_ring_lookup_is_deterministic(method in hash_method(), key in ".{0,64}") {
        let first = ring(method, &["a", "b", "c"]);
        let second = ring(method, &["a", "b", "c"]);
        prop_assert_eq!(first.lookup(&key), second.lookup(&key));
        prop_assert!(first.lookup(&key).is_some());
    }

    #[test]
    fn test_adding_node_only_moves_keys_to_it(
        method in hash_method(),
        keys in prop::collection::vec("[a-z0-9:]{1,24}", 1..64),
    ) {
        let before = ring(method, &["a", "b", "c"]);
        let after = ring(method, &["a", "b", "c", "d"]);

        for key in &keys {
            let old = before.lookup(key);
            let new = after.lookup(key);
            prop_assert!(new == old || new == Some("d"), "{} moved {:?} -> {:?}", key, old, new);
        }
    }

    #[test]
    fn test_mod_bucket_matches_captured_id(id in 0i64..1_000_000, factor in 1i64..64) {
        let strategy =
            RoutingStrategy::modular("p", RoutingMethod::Mod, Some(r"user:(\d+)"), Some(factor))
                .unwrap();
        let key = format!("user:{}:profile", id);
        prop_assert_eq!(strategy.route(&key), Some(ShardId::Bucket(id % factor)));
    }

    #[test]
    fn test_div_bucket_matches_quotient(id in 0i64..1_000_000, factor in 1i64..10_000) {
        let strategy =
            RoutingStrategy::modular("p", RoutingMethod::Div, Some(r"order:(\d+)"), Some(factor))
                .unwrap();
        let key = format!("order:{}", id);
        prop_assert_eq!(strategy.route(&key), Some(ShardId::Bucket(id / factor)));
    }

    #[test]
    fn test_hash_mod_stays_in_range(key in ".{0,64}", factor in 1i64..64) {
        let strategy =
            RoutingStrategy::modular("p", RoutingMethod::HashMod, None, Some(factor)).unwrap();
        match strategy.route(&key) {
            Some(ShardId::Bucket(bucket)) => prop_assert!((0..factor).contains(&bucket)),
            other => prop_assert!(false, "unexpected route {:?}", other),
        }
    }
}

//! Consistent hash ring
//!
//! Each node contributes `replicas` virtual nodes. A key belongs to the first
//! virtual node at or after the key's hash, wrapping around to the lowest
//! position. Only keys that hashed onto a node's virtual nodes move when that
//! node joins or leaves.
//!
//! ```text
//!   0 ──── a-000 ──── b-007 ──── a-013 ──── c-001 ──── u32::MAX
//!             ▲ keys in (c-001, a-000] wrap around to node a
//! ```

use super::hash::HashMethod;
use std::collections::BTreeMap;

/// Virtual nodes per child when the child config does not say otherwise
pub const DEFAULT_REPLICAS: u32 = 32;

/// Hash ring over named nodes. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct HashRing {
    method: HashMethod,
    nodes: Vec<String>,
    /// Ring position -> index into `nodes`
    positions: BTreeMap<u32, usize>,
}

impl HashRing {
    /// Create an empty ring using `method` for both keys and virtual nodes
    pub fn new(method: HashMethod) -> Self {
        Self {
            method,
            nodes: Vec::new(),
            positions: BTreeMap::new(),
        }
    }

    /// Build a ring from `(name, replicas)` pairs
    pub fn from_nodes<'a>(
        method: HashMethod,
        nodes: impl IntoIterator<Item = (&'a str, u32)>,
    ) -> Self {
        let mut ring = Self::new(method);
        for (name, replicas) in nodes {
            ring.add_node(name, replicas);
        }
        ring
    }

    /// Place `replicas` virtual nodes for `name` on the ring.
    /// A position already taken by an earlier node keeps its owner.
    pub fn add_node(&mut self, name: &str, replicas: u32) {
        let index = self.nodes.len();
        self.nodes.push(name.to_string());

        for replica in 0..replicas {
            let label = format!("{}-{:03}", name, replica);
            let position = self.method.hash_key(&label);
            self.positions.entry(position).or_insert(index);
        }
    }

    /// Node owning `key`, or `None` if the ring is empty
    pub fn lookup(&self, key: &str) -> Option<&str> {
        let position = self.method.hash_key(key);
        let (_, &index) = self
            .positions
            .range(position..)
            .next()
            .or_else(|| self.positions.iter().next())?;
        Some(self.nodes[index].as_str())
    }

    /// Hash function in use
    pub fn method(&self) -> HashMethod {
        self.method
    }

    /// Number of nodes added
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of occupied ring positions
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ring(nodes: &[&str]) -> HashRing {
        HashRing::from_nodes(
            HashMethod::Crc32,
            nodes.iter().map(|name| (*name, DEFAULT_REPLICAS)),
        )
    }

    #[test]
    fn test_empty_ring_has_no_owner() {
        let ring = HashRing::new(HashMethod::Crc32);
        assert!(ring.is_empty());
        assert_eq!(ring.lookup("anything"), None);
    }

    #[test]
    fn test_single_node_owns_everything() {
        let ring = ring(&["only"]);
        for i in 0..100 {
            assert_eq!(ring.lookup(&format!("key:{}", i)), Some("only"));
        }
    }

    #[test]
    fn test_virtual_node_count() {
        let ring = ring(&["a", "b", "c"]);
        assert_eq!(ring.node_count(), 3);
        // Collisions are possible but vanishingly rare for 96 labels
        assert!(ring.len() > 90 && ring.len() <= 96);
    }

    #[test]
    fn test_keys_spread_over_nodes() {
        let ring = HashRing::from_nodes(
            HashMethod::Md5,
            ["a", "b", "c", "d"].map(|name| (name, DEFAULT_REPLICAS)),
        );
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for i in 0..4000 {
            let owner = ring.lookup(&format!("user:{}", i)).unwrap();
            *counts.entry(owner).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        for count in counts.values() {
            assert!(*count > 200, "unbalanced ring: {:?}", counts);
        }
    }

    #[test]
    fn test_removed_node_only_moves_its_own_keys() {
        let full = ring(&["a", "b", "c"]);
        let without_b = ring(&["a", "c"]);

        for i in 0..2000 {
            let key = format!("session:{}", i);
            let before = full.lookup(&key).unwrap();
            let after = without_b.lookup(&key).unwrap();
            if before != "b" {
                assert_eq!(before, after, "key {} moved off a surviving node", key);
            }
        }
    }

    #[test]
    fn test_md5_ring() {
        let ring = HashRing::from_nodes(HashMethod::Md5, [("x", 8), ("y", 8)]);
        assert_eq!(ring.method(), HashMethod::Md5);
        let owner = ring.lookup("key").unwrap();
        assert!(owner == "x" || owner == "y");
        assert_eq!(ring.lookup("key"), Some(owner));
    }
}

use std::{
    collections::{hash_map::DefaultHasher, BTreeMap},
    hash::{Hash, Hasher},
};

/// Virtual nodes per physical node; smooths key distribution across a small
/// destination set.
const DEFAULT_REPLICAS: usize = 32;

/// Consistent-hash ring mapping partition keys onto destination addresses.
/// Keys land on the first virtual node at or after their hash, wrapping
/// around the ring.
pub(crate) struct HashRing {
    replicas: usize,
    ring: BTreeMap<u64, String>,
}

impl HashRing {
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_REPLICAS)
    }

    pub fn with_replicas(replicas: usize) -> Self {
        Self {
            replicas,
            ring: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, node: &str) {
        for replica in 0..self.replicas {
            let point = hash_of(&format!("{node}#{replica}"));
            self.ring.insert(point, node.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }
        let point = hash_of(&key);
        self.ring
            .range(point..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

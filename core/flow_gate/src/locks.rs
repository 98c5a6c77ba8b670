//! Sharded per-pair lock table
//!
//! Every pair transition (read observed state, decide, issue the request)
//! must run as one serialized unit per [`PairKey`]. A single global lock
//! would be correct but stalls unrelated pairs behind each other's platform
//! calls, so the table hashes each key onto one of a fixed set of shard
//! mutexes. Two distinct keys on the same shard serialize harmlessly; the
//! same key always lands on the same shard, which is the invariant that
//! matters.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::{Mutex, MutexGuard};

use crate::pair::PairKey;

/// Fixed-size table of shard mutexes, indexed by pair-key hash.
pub struct PairLocks {
    shards: Box<[Mutex<()>]>,
}

impl PairLocks {
    /// Create a table with the given shard count, rounded up to a power of
    /// two so indexing can mask instead of divide.
    pub fn new(shards: usize) -> Self {
        let count = shards.max(1).next_power_of_two();
        let shards = (0..count).map(|_| Mutex::new(())).collect::<Vec<_>>();

        PairLocks {
            shards: shards.into_boxed_slice(),
        }
    }

    /// Acquire the shard guarding `key`, blocking until it is free.
    pub fn guard(&self, key: &PairKey) -> MutexGuard<'_, ()> {
        self.shards[self.shard_index(key)].lock()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_index(&self, key: &PairKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & (self.shards.len() - 1)
    }
}

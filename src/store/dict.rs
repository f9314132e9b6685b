//! Concurrent keyspace
//!
//! `Dict` is the narrow interface the databases program against;
//! `ShardedDict` implements it as a fixed array of lock stripes, each a
//! SipHash map behind its own `RwLock`. Every single-key operation takes
//! exactly one stripe lock, which makes it linearizable; nothing is
//! promised across keys living in different stripes.

use super::DataEntity;
use bytes::Bytes;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use siphasher::sip::SipHasher13;

/// Map type of a single stripe
type StripeMap = HashMap<Bytes, Arc<DataEntity>, BuildHasherDefault<SipHasher13>>;

/// Keys for the stripe selector, distinct from the map hasher so that
/// keys sharing a stripe still spread over the stripe's buckets
const STRIPE_KEY0: u64 = 0x9e37_79b9_7f4a_7c15;
const STRIPE_KEY1: u64 = 0xc2b2_ae3d_27d4_eb4f;

/// Thread-safe mapping from key to entity
///
/// Counting operations return the occupancy delta: 1 when the call changed
/// whether (or with what) the key is held, 0 when it left the map untouched.
pub trait Dict: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Arc<DataEntity>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upsert; 1 if the key was absent before the call
    fn put(&self, key: Bytes, entity: Arc<DataEntity>) -> usize;

    /// Insert only when absent; 1 on insert
    fn put_if_absent(&self, key: Bytes, entity: Arc<DataEntity>) -> usize;

    /// Overwrite only when present; 1 on overwrite
    fn put_if_exists(&self, key: Bytes, entity: Arc<DataEntity>) -> usize;

    /// Delete the key; 1 if it was present
    fn remove(&self, key: &[u8]) -> usize;

    /// Remove every listed key that exists, one at a time
    fn removes(&self, keys: &[Bytes]) -> usize {
        keys.iter().map(|key| self.remove(key)).sum()
    }

    /// Visit entries until the visitor returns false
    ///
    /// Weakly consistent: a concurrent insert or removal may or may not be seen.
    fn for_each(&self, visitor: &mut dyn FnMut(&Bytes, &Arc<DataEntity>) -> bool);

    fn keys(&self) -> Vec<Bytes> {
        let mut keys = Vec::with_capacity(self.len());
        self.for_each(&mut |key, _| {
            keys.push(key.clone());
            true
        });
        keys
    }

    /// `limit` keys sampled with replacement
    fn random_keys(&self, limit: usize) -> Vec<Bytes>;

    /// At most `limit` distinct keys sampled without replacement
    fn random_distinct_keys(&self, limit: usize) -> Vec<Bytes>;

    fn clear(&self);
}

/// Lock-striped `Dict`
pub struct ShardedDict {
    stripes: Box<[RwLock<StripeMap>]>,
}

impl ShardedDict {
    /// Create a dict sized for this machine
    pub fn new() -> Self {
        Self::with_stripes(default_stripes())
    }

    /// Create a dict with the given number of stripes (rounded up to a power of two)
    pub fn with_stripes(stripes: usize) -> Self {
        let count = stripes.max(1).next_power_of_two();
        ShardedDict {
            stripes: (0..count)
                .map(|_| RwLock::new(StripeMap::default()))
                .collect(),
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_of(&self, key: &[u8]) -> usize {
        let mut hasher = SipHasher13::new_with_keys(STRIPE_KEY0, STRIPE_KEY1);
        key.hash(&mut hasher);
        (hasher.finish() as usize) & (self.stripes.len() - 1)
    }

    fn read(&self, idx: usize) -> RwLockReadGuard<'_, StripeMap> {
        self.stripes[idx].read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, idx: usize) -> RwLockWriteGuard<'_, StripeMap> {
        self.stripes[idx].write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ShardedDict {
    fn default() -> Self {
        Self::new()
    }
}

impl Dict for ShardedDict {
    fn get(&self, key: &[u8]) -> Option<Arc<DataEntity>> {
        self.read(self.stripe_of(key)).get(key).cloned()
    }

    fn len(&self) -> usize {
        (0..self.stripes.len()).map(|idx| self.read(idx).len()).sum()
    }

    fn put(&self, key: Bytes, entity: Arc<DataEntity>) -> usize {
        let mut stripe = self.write(self.stripe_of(&key));
        match stripe.insert(key, entity) {
            Some(_) => 0,
            None => 1,
        }
    }

    fn put_if_absent(&self, key: Bytes, entity: Arc<DataEntity>) -> usize {
        let mut stripe = self.write(self.stripe_of(&key));
        if stripe.contains_key(&key) {
            return 0;
        }
        stripe.insert(key, entity);
        1
    }

    fn put_if_exists(&self, key: Bytes, entity: Arc<DataEntity>) -> usize {
        let mut stripe = self.write(self.stripe_of(&key));
        match stripe.get_mut(&key) {
            Some(slot) => {
                *slot = entity;
                1
            }
            None => 0,
        }
    }

    fn remove(&self, key: &[u8]) -> usize {
        let mut stripe = self.write(self.stripe_of(key));
        match stripe.remove(key) {
            Some(_) => 1,
            None => 0,
        }
    }

    fn for_each(&self, visitor: &mut dyn FnMut(&Bytes, &Arc<DataEntity>) -> bool) {
        for idx in 0..self.stripes.len() {
            let stripe = self.read(idx);
            for (key, entity) in stripe.iter() {
                if !visitor(key, entity) {
                    return;
                }
            }
        }
    }

    fn random_keys(&self, limit: usize) -> Vec<Bytes> {
        let keys = self.keys();
        let mut rng = rand::thread_rng();
        (0..limit)
            .filter_map(|_| keys.choose(&mut rng).cloned())
            .collect()
    }

    fn random_distinct_keys(&self, limit: usize) -> Vec<Bytes> {
        let keys = self.keys();
        let mut rng = rand::thread_rng();
        keys.choose_multiple(&mut rng, limit).cloned().collect()
    }

    fn clear(&self) {
        for idx in 0..self.stripes.len() {
            self.write(idx).clear();
        }
    }
}

/// Four stripes per core, at least 16
fn default_stripes() -> usize {
    (num_cpus::get() * 4).max(16).next_power_of_two()
}

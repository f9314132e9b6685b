//! Consistent hash ring
//!
//! Each member is hashed onto a 32-bit ring at a fixed number of virtual
//! positions. A key belongs to the member owning the first position at or
//! after the key's hash, wrapping around past the end. The ring depends only
//! on the member list, so every node built from the same configuration
//! agrees on ownership without talking to the others.

use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Virtual positions per member
pub const DEFAULT_REPLICAS: usize = 64;

/// Immutable ring built once at startup
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Sorted (position, member index) pairs
    positions: Vec<(u32, usize)>,
    members: Vec<String>,
}

impl HashRing {
    /// Build a ring placing every member at `replicas` positions
    pub fn new<S: AsRef<str>>(members: &[S], replicas: usize) -> Self {
        let members: Vec<String> = members.iter().map(|m| m.as_ref().to_string()).collect();
        let replicas = replicas.max(1);

        let mut positions = Vec::with_capacity(members.len() * replicas);
        for (idx, member) in members.iter().enumerate() {
            for replica in 0..replicas {
                let point = ring_hash(format!("{}{}", replica, member).as_bytes());
                positions.push((point, idx));
            }
        }
        // Position collisions are broken by member name, not list order
        positions.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| members[a.1].cmp(&members[b.1])));

        HashRing { positions, members }
    }

    /// Member owning `key`, or None for an empty ring
    pub fn pick_node(&self, key: &[u8]) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }

        let hash = ring_hash(partition_key(key));
        let idx = self.positions.partition_point(|&(point, _)| point < hash);
        let (_, member) = self.positions[idx % self.positions.len()];
        Some(&self.members[member])
    }
}

/// Position on the ring: SipHash13 with fixed keys, folded to 32 bits
fn ring_hash(data: &[u8]) -> u32 {
    let mut hasher = SipHasher13::new();
    hasher.write(data);
    let hash = hasher.finish();
    (hash ^ (hash >> 32)) as u32
}

/// The part of a key that is hashed: the content of the first non-empty
/// `{...}` tag if present, so related keys can be kept on one member
fn partition_key(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        if let Some(len) = key[open + 1..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[open + 1..open + 1 + len];
            }
        }
    }
    key
}

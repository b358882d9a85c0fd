//! Read-name hashing for worker routing and horizontal sharding.
//!
//! Two independent partitions are derived from the same name hash:
//!
//! - the **worker** partition decides which in-process locator buffers a read, and
//! - the **horizontal** partition decides which cooperating process emits a completed pair.
//!
//! Both must agree across processes and machines, so the hash is 64-bit FNV-1a over the raw
//! name bytes rather than a seeded hasher. The worker index uses the hash rotated by 32 bits
//! so that the two partitions stay uncorrelated when the worker and shard counts coincide.

use std::fmt;
use std::str::FromStr;

use crate::errors::{FgmateError, Result};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable 64-bit hash of a read name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ReadNameHash(u64);

impl ReadNameHash {
    /// Hashes a read name.
    #[must_use]
    pub fn of(name: &[u8]) -> Self {
        let hash = name.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        });
        Self(hash)
    }

    /// Raw hash value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Worker index in `0..workers`.
    ///
    /// # Panics
    ///
    /// Panics if `workers` is zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn worker(self, workers: usize) -> usize {
        (self.0.rotate_left(32) % workers as u64) as usize
    }

    /// Horizontal shard index in `0..total`.
    ///
    /// # Panics
    ///
    /// Panics if `total` is zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn shard(self, total: usize) -> usize {
        (self.0 % total as u64) as usize
    }
}

/// One slice of a horizontally sharded run, stored 0-based.
///
/// On the command line shards are written 1-based as `ID,COUNT` or `ID/COUNT`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShardSpec {
    id: usize,
    count: usize,
}

impl Default for ShardSpec {
    fn default() -> Self {
        Self::UNSHARDED
    }
}

impl ShardSpec {
    /// A single process handling every pair.
    pub const UNSHARDED: Self = Self { id: 0, count: 1 };

    /// Creates a shard from a 0-based id.
    ///
    /// # Errors
    ///
    /// Returns an error if `count` is zero or `id >= count`.
    pub fn new(id: usize, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(FgmateError::InvalidShardSpec {
                spec: format!("{},{count}", id + 1),
                reason: "shard count must be at least 1".to_string(),
            });
        }
        if id >= count {
            return Err(FgmateError::InvalidShardSpec {
                spec: format!("{},{count}", id + 1),
                reason: format!("shard id must be between 1 and {count}"),
            });
        }
        Ok(Self { id, count })
    }

    /// 0-based shard id.
    #[must_use]
    pub fn id(self) -> usize {
        self.id
    }

    /// Total number of shards.
    #[must_use]
    pub fn count(self) -> usize {
        self.count
    }

    /// True when more than one shard is configured.
    #[must_use]
    pub fn is_sharded(self) -> bool {
        self.count > 1
    }

    /// True if a pair with this name hash belongs to this shard.
    #[must_use]
    pub fn owns(self, hash: ReadNameHash) -> bool {
        hash.shard(self.count) == self.id
    }
}

impl FromStr for ShardSpec {
    type Err = FgmateError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| FgmateError::InvalidShardSpec {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let (id, count) = s
            .split_once([',', '/'])
            .ok_or_else(|| invalid("expected ID,COUNT or ID/COUNT"))?;
        let id: usize = id.trim().parse().map_err(|_| invalid("shard id is not an integer"))?;
        let count: usize =
            count.trim().parse().map_err(|_| invalid("shard count is not an integer"))?;

        if count == 0 {
            return Err(invalid("shard count must be at least 1"));
        }
        if id == 0 || id > count {
            return Err(invalid(&format!("shard id must be between 1 and {count}")));
        }
        Ok(Self { id: id - 1, count })
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.id + 1, self.count)
    }
}

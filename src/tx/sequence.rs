//! Per-address serialization of sequence use
//!
//! Handles:
//! - One critical section per signing address, from account lookup to
//!   broadcast acknowledgement
//! - Independent addresses proceeding in parallel
//! - Dropping lock entries nobody holds
//!
//! Sequences themselves are never cached: every holder re-reads the
//! account from the network inside its critical section.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Exclusive right to sign and broadcast for one address
pub struct SequenceGuard {
    address: String,
    _guard: OwnedMutexGuard<()>,
}

impl SequenceGuard {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for SequenceGuard {
    fn drop(&mut self) {
        debug!("Released sequence lock for {}", self.address);
    }
}

/// Lock table keyed by signer address
#[derive(Default)]
pub struct SequenceLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SequenceLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds `address`, then hold it
    pub async fn acquire(&self, address: &str) -> SequenceGuard {
        // Clone the mutex out so no map shard stays locked across the await
        let lock = self
            .locks
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.lock_owned().await;
        debug!("Acquired sequence lock for {}", address);

        SequenceGuard {
            address: address.to_string(),
            _guard: guard,
        }
    }

    /// Remove entries that are neither held nor awaited
    pub fn prune_idle(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of addresses with a lock entry
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

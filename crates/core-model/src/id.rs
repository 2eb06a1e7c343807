//! Monotonic line ID generation.
//!
//! IDs compose a per-generator base (startup time mixed with a host seed)
//! with an incrementing serial, so they are strictly increasing within one
//! generator and practically unique across concurrent invocations feeding a
//! shared terminal. The generator is injected wherever lines are minted;
//! tests use [`IdGen::fixed`] for small deterministic IDs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct IdGen {
    base: u64,
    serial: AtomicU64,
}

impl IdGen {
    /// Generator seeded from wall-clock seconds and a host/process seed.
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            // Time in the high bits keeps IDs roughly sortable across runs;
            // the seed occupies bits the serial will not plausibly reach.
            base: (secs << 24) ^ (host_seed() & 0xff_ffff),
            serial: AtomicU64::new(0),
        }
    }

    /// Deterministic generator for tests: IDs are `base + 1, base + 2, …`.
    pub fn fixed(base: u64) -> Self {
        Self {
            base,
            serial: AtomicU64::new(0),
        }
    }

    /// Mint the next ID. Strictly increasing per generator.
    pub fn next(&self) -> u64 {
        self.base + self.serial.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

fn host_seed() -> u64 {
    let mut hasher = DefaultHasher::new();
    std::process::id().hash(&mut hasher);
    if let Ok(host) = std::env::var("HOSTNAME") {
        host.hash(&mut hasher);
    }
    hasher.finish()
}

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);
static FALLBACK_REPORTED: AtomicBool = AtomicBool::new(false);

/// Idempotency key under which an event is written to the backend.
///
/// Random 128-bit value laid out as a UUID v4. A fresh one is allocated
/// for every event as it joins a batch and is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Allocate a new identity.
    ///
    /// Randomness comes from the operating system. If the OS source
    /// fails, the bytes are drawn from a `StdRng` seeded with the wall
    /// clock, the process id and a process-wide counter instead. That
    /// generator is weaker but never blocks or errors: a near-collision
    /// at the backend is preferable to losing the event.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        if let Err(err) = OsRng.try_fill_bytes(&mut bytes) {
            if !FALLBACK_REPORTED.swap(true, Ordering::Relaxed) {
                tracing::warn!(error = %err, "OS randomness unavailable, using degraded document id generator");
            }
            fill_degraded(&mut bytes);
        }
        DocumentId(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for DocumentId {
    fn from(uuid: Uuid) -> Self {
        DocumentId(uuid)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

fn fill_degraded(bytes: &mut [u8; 16]) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let count = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let seed = nanos ^ count.rotate_left(32) ^ u64::from(std::process::id()).rotate_left(17);
    StdRng::seed_from_u64(seed).fill_bytes(bytes);
}

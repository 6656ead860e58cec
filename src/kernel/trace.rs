//! Trace ids for correlating unclassified/internal errors in logs without
//! leaking details to end users.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A short, 12-hex-character id safe to surface to a user alongside a
/// generic "something went wrong" message, while letting an operator grep
/// logs for the matching internal error.
pub fn new_trace_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..6])
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

// Discord epoch: 2015-01-01T00:00:00Z
pub const EPOCH: u64 = 1_420_070_400_000;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH)
}

/// A locally unique snowflake for the current time, used as a request nonce.
/// The low 22 bits are a process-wide counter.
pub fn generate() -> String {
    let timestamp = now_ms().saturating_sub(EPOCH);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0x3F_FFFF;
    ((timestamp << 22) | seq).to_string()
}

/// Unix milliseconds at which `id` was created.
pub fn timestamp_of(id: &str) -> Option<u64> {
    let num: u64 = id.parse().ok()?;
    Some((num >> 22) + EPOCH)
}

pub fn created_at(id: &str) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(i64::try_from(timestamp_of(id)?).ok()?)
}

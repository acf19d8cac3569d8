//! Wall-clock helper for record timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds; `0` if the system clock predates the epoch.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

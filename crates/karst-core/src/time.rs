//! Monotonic time source shared by the whole workspace.

use std::sync::OnceLock;
use std::time::Instant;

/// Returns monotonic nanoseconds since an arbitrary process-local epoch.
///
/// Uses `OnceLock<Instant>` to lazily initialise a baseline. NOT
/// wall-clock time — only for relative comparisons (tick cadence,
/// catch-up detection).
///
/// This is the single source of truth for monotonic timestamps: the
/// scheduler, pool, and any element that needs "now" must use this
/// function so timestamps are comparable across threads.
pub fn monotonic_nanos() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    Instant::now().duration_since(*epoch).as_nanos() as u64
}

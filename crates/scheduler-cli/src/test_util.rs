//! Test-only helpers shared across this crate's unit tests.

use std::sync::{Mutex, OnceLock};

/// Serializes tests that mutate process environment variables, so parallel
/// `cargo test` runs do not stomp on each other's `SCHED_DATABASE_URL` etc.
pub fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}

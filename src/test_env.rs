//! Process environment helpers shared by unit tests.
//!
//! Every test that reads or writes an environment variable holds
//! [`lock`] for its whole body, so `set_var`/`remove_var` never race with
//! another test in this binary.

use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serializes environment access. A panicked holder does not poison later tests.
pub(crate) fn lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// SAFETY: callers hold the guard from `lock()`, and every env-touching test in
// the crate goes through it.
pub(crate) fn set_env(key: &str, value: &str) {
    unsafe { std::env::set_var(key, value) }
}

pub(crate) fn remove_env(key: &str) {
    unsafe { std::env::remove_var(key) }
}

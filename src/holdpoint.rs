//! Pause/resume synchronization for test harnesses.
//!
//! A hold is a user property on a dataset. A harness sets it to stop an
//! observed party at a known point and clears it to let that party
//! continue. Both sides see the same property through the zfs tool, so the
//! mechanism works across processes and hosts sharing the pool.
//!
//! The waits poll once per second and never time out; clearing the property
//! is the only way to release them.

use anyhow::Result;
use std::thread;
use std::time::Duration;

use crate::zfs;

/// User property carrying the hold flag.
pub const HOLD_PROPERTY: &str = "com.delphix:migration:hold";

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Raise the hold flag on a dataset.
pub fn hold(dataset: &str) -> Result<()> {
    zfs::set(dataset, HOLD_PROPERTY, "on")
}

/// Clear the hold flag.
pub fn release(dataset: &str) -> Result<()> {
    zfs::inherit(dataset, HOLD_PROPERTY)
}

/// Whether the hold flag is currently raised.
pub fn is_held(dataset: &str) -> Result<bool> {
    Ok(matches!(
        zfs::get(dataset, HOLD_PROPERTY)?.as_deref(),
        Some("on")
    ))
}

/// Block until the hold flag is raised.
pub fn wait_held(dataset: &str) -> Result<()> {
    while !is_held(dataset)? {
        thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

/// Block until the hold flag is cleared.
pub fn wait_released(dataset: &str) -> Result<()> {
    while is_held(dataset)? {
        thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

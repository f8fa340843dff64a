//! Progress reporting for the upgrade monitor.
//!
//! The monitor driving the migration scrapes stdout for timestamped
//! increment lines and treats the percentage as cumulative. Two are emitted
//! per run: one after cleanup, one at the very end.

use chrono::Utc;

/// Emit one progress increment on stdout.
pub fn increment(percent: u32) {
    println!("{}", line(percent));
}

fn line(percent: u32) -> String {
    format!(
        "{} Progress increment: {}",
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
        percent
    )
}

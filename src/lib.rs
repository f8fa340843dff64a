//! Provisions the Linux migration boot environment on a running appliance.
//!
//! The binaries are thin wrappers; everything they do is reachable from
//! here so the integration tests can drive the stages directly.

pub mod archive;
pub mod bootconf;
pub mod config;
pub mod context;
pub mod error;
pub mod fstab;
pub mod holdpoint;
pub mod process;
pub mod progress;
pub mod stages;
pub mod version;
pub mod zfs;

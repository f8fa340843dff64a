//! Precondition checks: tools, archive shape, and the version gate.
//!
//! Nothing here changes system state. Every later stage assumes the
//! archive, the running version, and the pool are already known good.

use std::path::Path;

use crate::archive::UpgradeArchive;
use crate::config::Config;
use crate::context::{RunContext, PROP_CURRENT_VERSION};
use crate::error::MigrationError;
use crate::version::Version;
use crate::zfs;

/// Floor every supported archive must declare, compared exactly.
pub const REQUIRED_MIN_VERSION: &str = "5.3.6.0";
/// The same floor as a version, for gating the running system.
pub const REQUIRED_FLOOR: Version = Version {
    major: 5,
    minor: 3,
    patch: 6,
};

/// External commands the pipeline shells out to.
const REQUIRED_TOOLS: [&str; 5] = ["zfs", "mount", "umount", "tar", "hostid"];

pub fn run(config: &Config, archive_dir: &Path) -> Result<RunContext, MigrationError> {
    for tool in REQUIRED_TOOLS {
        which::which(tool).map_err(|_| MigrationError::MissingTool(tool.to_string()))?;
    }

    let archive = UpgradeArchive::open(archive_dir)?;
    println!(
        "Validated upgrade archive {} at {}",
        archive.version,
        archive_dir.display()
    );

    if archive.min_version != REQUIRED_MIN_VERSION {
        return Err(MigrationError::VersionFloorMismatch {
            expected: REQUIRED_MIN_VERSION,
            found: archive.min_version,
        });
    }

    let (running_version, pool) = running_system()?;
    println!("Running system is {} on pool {}", running_version, pool);

    if !running_version.satisfies_floor(&REQUIRED_FLOOR) {
        return Err(MigrationError::UnsupportedRunningVersion {
            running: running_version.to_string(),
            floor: REQUIRED_FLOOR.to_string(),
        });
    }

    Ok(RunContext::new(
        config.clone(),
        archive,
        running_version,
        pool,
    ))
}

/// Version and pool of the system we are migrating away from.
///
/// The version comes from the user property stamped on the root dataset,
/// the same property every upgrade maintains, so a system that was never
/// stamped reads as unsupported rather than as an error of ours.
fn running_system() -> Result<(Version, String), MigrationError> {
    let unsupported = |running: String| MigrationError::UnsupportedRunningVersion {
        running,
        floor: REQUIRED_FLOOR.to_string(),
    };

    let root_dataset = zfs::root_dataset()
        .map_err(|e| unsupported(format!("unknown ({:#})", e)))?;
    let value = zfs::get(&root_dataset, PROP_CURRENT_VERSION)
        .map_err(|e| unsupported(format!("unknown ({:#})", e)))?
        .ok_or_else(|| unsupported("unknown (root dataset carries no version)".to_string()))?;
    let version = Version::parse(&value).map_err(|_| unsupported(value.clone()))?;

    let pool = root_dataset
        .split('/')
        .next()
        .unwrap_or(root_dataset.as_str())
        .to_string();

    Ok((version, pool))
}

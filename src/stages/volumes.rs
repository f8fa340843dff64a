//! Creation of the dataset hierarchy hosting the new environment.
//!
//! Two non-mountable containers (the migration container and this run's
//! instance) hold four leaf volumes: root, home, data, and log. The
//! instance carries the version properties upgrades maintain from then on.
//! Creation order follows the hierarchy, parents strictly first.

use std::fs;

use crate::context::{RunContext, PROP_CURRENT_VERSION, PROP_INITIAL_VERSION};
use crate::error::MigrationError;
use crate::zfs;

/// Leaf volumes holding per-instance mutable state, `mountpoint=legacy` so
/// the new environment's own mount table controls them.
const LEGACY_LEAVES: [&str; 3] = ["home", "data", "log"];

pub fn run(ctx: &RunContext) -> Result<(), MigrationError> {
    let create = |name: &str, properties: &[(&str, &str)]| -> Result<(), MigrationError> {
        zfs::create(name, properties).map_err(|e| MigrationError::VolumeCreateFailed {
            name: name.to_string(),
            reason: format!("{:#}", e),
        })
    };

    let container = ctx.container();
    println!("Creating migration datasets under {}", container);
    create(&container, &[("canmount", "off"), ("mountpoint", "none")])?;

    let version = ctx.archive.version.as_str();
    create(
        &ctx.instance(),
        &[
            ("canmount", "off"),
            ("mountpoint", "none"),
            (PROP_INITIAL_VERSION, version),
            (PROP_CURRENT_VERSION, version),
        ],
    )?;

    // The root volume mounts at the transient path for now; finalize points
    // it at / once the payload is in place. canmount=noauto keeps the
    // running system from ever mounting it on its own.
    let root = ctx.dataset("root");
    let transient_root = ctx.transient_root();
    let mountpoint = transient_root.to_string_lossy().into_owned();
    create(
        &root,
        &[("canmount", "noauto"), ("mountpoint", &mountpoint)],
    )?;

    for leaf in LEGACY_LEAVES {
        create(&ctx.dataset(leaf), &[("mountpoint", "legacy")])?;
    }

    fs::create_dir_all(&transient_root).map_err(|e| MigrationError::VolumeMountFailed {
        name: root.clone(),
        reason: format!("cannot create mount point: {}", e),
    })?;
    zfs::mount(&root).map_err(|e| MigrationError::VolumeMountFailed {
        name: root.clone(),
        reason: format!("{:#}", e),
    })?;
    println!("Mounted {} at {}", root, transient_root.display());

    Ok(())
}

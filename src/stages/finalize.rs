//! Final verification and teardown of the transient state.
//!
//! After this stage the new environment is self-contained: nothing is
//! mounted, the root volume's mountpoint is `/`, and the working directory
//! is gone. Whether it actually boots is decided later, by activation.

use std::fs;

use crate::context::RunContext;
use crate::error::MigrationError;
use crate::fstab;
use crate::progress;
use crate::zfs;

pub fn run(ctx: &RunContext) -> Result<(), MigrationError> {
    let failed = |e: anyhow::Error| MigrationError::VerificationFailed(format!("{:#}", e));
    let root = ctx.transient_root();

    // The payload must never ship appliance data; the transient data
    // volume is destroyed below and the real one arrives at activation.
    let data_dir = root.join(fstab::DATA_TARGET.trim_start_matches('/'));
    let leftover: Vec<_> = fs::read_dir(&data_dir)
        .map_err(|e| MigrationError::VerificationFailed(format!(
            "cannot read {}: {}",
            data_dir.display(),
            e
        )))?
        .flatten()
        .collect();
    if !leftover.is_empty() {
        return Err(MigrationError::UnexpectedDataFound(format!(
            "{} ({} entries, first is {:?})",
            data_dir.display(),
            leftover.len(),
            leftover[0].file_name()
        )));
    }

    for target in [fstab::LOG_TARGET, fstab::HOME_TARGET] {
        zfs::unmount_path(&root.join(target.trim_start_matches('/'))).map_err(failed)?;
    }

    let data = ctx.dataset("data");
    println!("Destroying transient {}", data);
    zfs::destroy_force(&data).map_err(failed)?;

    let root_dataset = ctx.dataset("root");
    zfs::unmount(&root_dataset).map_err(failed)?;
    zfs::set_mountpoint(&root_dataset, "/").map_err(failed)?;

    fs::remove_dir_all(ctx.workdir()).map_err(|e| {
        MigrationError::VerificationFailed(format!(
            "cannot remove {}: {}",
            ctx.workdir().display(),
            e
        ))
    })?;

    println!("Boot environment {} is ready", ctx.instance());
    progress::increment(100);
    Ok(())
}

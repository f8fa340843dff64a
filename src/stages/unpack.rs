//! Payload extraction into the mounted hierarchy, plus the mount table the
//! new environment boots with.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::context::RunContext;
use crate::error::MigrationError;
use crate::fstab;
use crate::process::Cmd;
use crate::zfs;

pub fn run(ctx: &RunContext) -> Result<(), MigrationError> {
    let root = ctx.transient_root();

    mount_leaves(ctx, &root)?;
    extract_payload(ctx, &root)?;
    write_mount_table(ctx, &root)?;

    Ok(())
}

/// Mount the legacy leaves at their in-tree targets so extraction lands
/// user, data, and log paths on the right volumes.
fn mount_leaves(ctx: &RunContext, root: &Path) -> Result<(), MigrationError> {
    for (leaf, target) in fstab::LEAF_MOUNTS {
        let mount_point = root.join(target.trim_start_matches('/'));
        fs::create_dir_all(&mount_point).map_err(|e| {
            MigrationError::UnpackFailed(format!(
                "cannot create {}: {}",
                mount_point.display(),
                e
            ))
        })?;

        let dataset = ctx.dataset(leaf);
        zfs::mount_legacy(&dataset, &mount_point).map_err(|e| {
            MigrationError::VolumeMountFailed {
                name: dataset,
                reason: format!("{:#}", e),
            }
        })?;
    }
    Ok(())
}

/// Run tar over the payload. Ownership is numeric; the id spaces of the
/// build host and the appliance have nothing in common.
fn extract_payload(ctx: &RunContext, root: &Path) -> Result<(), MigrationError> {
    let payload = ctx.archive.rootfs_archive();
    println!(
        "Unpacking {} into {}",
        payload.display(),
        root.display()
    );

    let result = Cmd::new("tar")
        .args(["-x", "-p", "-z", "--numeric-owner", "-f"])
        .arg(&payload)
        .arg("-C")
        .arg(root)
        .allow_fail()
        .run()
        .map_err(|e| MigrationError::UnpackFailed(format!("{:#}", e)))?;

    if !result.success() {
        return Err(MigrationError::UnpackFailed(format!(
            "tar exited {}: {}",
            result.code(),
            result.stderr_trimmed()
        )));
    }

    let (files, bytes) = tree_stats(root);
    println!(
        "  Unpacked {} files ({:.1} MB)",
        files,
        bytes as f64 / (1024.0 * 1024.0)
    );

    Ok(())
}

/// Write the new environment's fstab into the unpacked tree.
fn write_mount_table(ctx: &RunContext, root: &Path) -> Result<(), MigrationError> {
    let entries = fstab::migration_entries(ctx);
    let path = root.join("etc/fstab");

    let failed = |e: std::io::Error| {
        MigrationError::UnpackFailed(format!("cannot write {}: {}", path.display(), e))
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(failed)?;
    }
    fs::write(&path, fstab::render(&entries)).map_err(failed)?;

    println!("  Wrote {} mount table entries", entries.len());
    Ok(())
}

/// File count and byte total of the unpacked tree, for the run log.
fn tree_stats(root: &Path) -> (usize, u64) {
    let mut files = 0usize;
    let mut bytes = 0u64;
    for entry in WalkDir::new(root).into_iter().flatten() {
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    (files, bytes)
}

//! Removal of whatever a prior run left behind.
//!
//! A failed or completed earlier attempt can leave working directories,
//! boot images, the dataset container, and menu lines. Each category is
//! removed independently and verified gone afterwards, so a run always
//! starts from the same clean state no matter how its predecessor ended.

use std::fs;

use crate::archive::{INITRD_PREFIX, KERNEL_PREFIX};
use crate::bootconf::{MenuConfig, MENU_SLOT};
use crate::context::{RunContext, WORKDIR_PREFIX};
use crate::error::MigrationError;
use crate::progress;
use crate::zfs;

pub fn run(ctx: &RunContext) -> Result<(), MigrationError> {
    // Container first: destroying it unmounts any leftover instance
    // volumes, which is what makes the working directories removable.
    remove_container(ctx)?;
    remove_workdirs(ctx)?;
    remove_boot_images(ctx)?;
    remove_menu_entry(ctx)?;

    progress::increment(20);
    Ok(())
}

fn fail<E: std::fmt::Display>(e: E) -> MigrationError {
    MigrationError::CleanupFailed(format!("{:#}", e))
}

/// Remove every `delphix.migration.*` entry under the tmp root, whichever
/// run it belonged to.
fn remove_workdirs(ctx: &RunContext) -> Result<(), MigrationError> {
    let tmp_dir = &ctx.config.tmp_dir;
    if !tmp_dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(tmp_dir).map_err(fail)? {
        let entry = entry.map_err(fail)?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(WORKDIR_PREFIX) {
            continue;
        }

        let path = entry.path();
        println!("Removing stale working directory {}", path.display());
        if path.is_dir() {
            fs::remove_dir_all(&path).map_err(fail)?;
        } else {
            fs::remove_file(&path).map_err(fail)?;
        }
    }

    Ok(())
}

/// Remove previously installed kernel and initrd images from the boot
/// directory. The running system's own loader files share the directory
/// but never match these prefixes.
fn remove_boot_images(ctx: &RunContext) -> Result<(), MigrationError> {
    let boot_dir = &ctx.config.boot_dir;
    if !boot_dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(boot_dir).map_err(fail)? {
        let entry = entry.map_err(fail)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(KERNEL_PREFIX) || name.starts_with(INITRD_PREFIX) {
            println!("Removing stale boot image {}", name);
            fs::remove_file(entry.path()).map_err(fail)?;
        }
    }

    Ok(())
}

/// Destroy the migration container and every instance under it, then
/// verify it is no longer listed.
fn remove_container(ctx: &RunContext) -> Result<(), MigrationError> {
    let container = ctx.container();
    if !zfs::exists(&container).map_err(fail)? {
        return Ok(());
    }

    println!("Destroying leftover {}", container);
    zfs::destroy_recursive(&container).map_err(fail)?;

    if zfs::exists(&container).map_err(fail)? {
        return Err(MigrationError::CleanupFailed(format!(
            "{} is still listed after destroy",
            container
        )));
    }

    Ok(())
}

/// Strip the migration's menu lines and verify none remain on disk.
fn remove_menu_entry(ctx: &RunContext) -> Result<(), MigrationError> {
    let path = ctx.config.boot_menu_path();
    if !path.exists() {
        return Ok(());
    }

    let mut menu = MenuConfig::load(&path).map_err(fail)?;
    let removed = menu.remove_slot(MENU_SLOT);
    if removed > 0 {
        println!("Removing {} stale boot menu line(s)", removed);
        menu.save(&path).map_err(fail)?;
    }

    let reread = MenuConfig::load(&path).map_err(fail)?;
    if reread.owned_lines(MENU_SLOT) != 0 {
        return Err(MigrationError::CleanupFailed(format!(
            "{} still contains migration menu lines",
            path.display()
        )));
    }

    Ok(())
}

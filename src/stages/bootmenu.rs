//! Boot image installation and the loader menu entry.
//!
//! The images are copied out of the archive so the loader can read them
//! from the boot directory it already knows; the menu entry then chains
//! them with the kernel argument string pointing at this run's root volume.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::bootconf::{BootMenuEntry, MenuConfig, CMDLINE_VAR, MENU_KEYCODE, MENU_SLOT};
use crate::context::RunContext;
use crate::error::MigrationError;

/// Argument telling the new kernel which dataset holds its root.
const ROOT_ARG_PREFIX: &str = "root=ZFS=";
/// Console, crash kernel, and network arguments shared by every entry.
const FIXED_ARGS: &str = "console=tty0 console=ttyS0,115200n8 ipv6.disable=1 crashkernel=256M";
/// The pool was last imported by the running system, a different host id
/// from the one the new kernel would derive. Without a forced import the
/// first boot would refuse the pool.
const FORCE_IMPORT_ARG: &str = "zfs_force=1";

pub fn run(ctx: &RunContext) -> Result<(), MigrationError> {
    let failed = |e: anyhow::Error| MigrationError::BootInstallFailed(format!("{:#}", e));

    let boot_dir = &ctx.config.boot_dir;
    let kernel = ctx.archive.kernel_image().map_err(failed)?;
    let initrd = ctx.archive.initrd_image().map_err(failed)?;

    let kernel_name = install_image(&kernel, boot_dir).map_err(failed)?;
    let initrd_name = install_image(&initrd, boot_dir).map_err(failed)?;
    println!("Installed boot images {} and {}", kernel_name, initrd_name);

    let entry = menu_entry(
        &kernel_arguments(&ctx.dataset("root")),
        &boot_dir.join(&kernel_name),
        &boot_dir.join(&initrd_name),
    );

    let path = ctx.config.boot_menu_path();
    let mut menu = MenuConfig::load(&path).map_err(failed)?;
    menu.append(&entry, MENU_SLOT);
    menu.save(&path).map_err(failed)?;
    println!("Added loader menu entry at slot {}", MENU_SLOT);

    Ok(())
}

/// The kernel argument string for an instance root volume.
pub fn kernel_arguments(root_dataset: &str) -> String {
    format!(
        "{}{} rootfstype=zfs {} {}",
        ROOT_ARG_PREFIX, root_dataset, FIXED_ARGS, FORCE_IMPORT_ARG
    )
}

/// Copy one image into the boot directory, returning its file name.
fn install_image(image: &Path, boot_dir: &Path) -> Result<String> {
    let name = image
        .file_name()
        .with_context(|| format!("{} has no file name", image.display()))?;
    let dst = boot_dir.join(name);
    fs::copy(image, &dst)
        .with_context(|| format!("cannot copy {} to {}", image.display(), dst.display()))?;
    Ok(name.to_string_lossy().into_owned())
}

/// Build the menu entry chaining kernel, initial filesystem, and boot.
fn menu_entry(cmdline: &str, kernel: &Path, initrd: &Path) -> BootMenuEntry {
    // The hotkey letter gets ANSI bold in the styled caption.
    BootMenuEntry {
        cmdline: cmdline.to_string(),
        caption: "Boot Delphix Linux migration".to_string(),
        ansi_caption: "Boot Delphix Linux \u{1b}[1mm\u{1b}[migration".to_string(),
        keycode: MENU_KEYCODE,
        command: format!(
            "s\\\" load {} ${{{}}}\\\" evaluate s\\\" load -t rootfs {}\\\" evaluate s\\\" boot\\\" evaluate",
            kernel.display(),
            CMDLINE_VAR,
            initrd.display()
        ),
    }
}

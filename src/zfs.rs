//! Thin wrappers around the zfs, mount, and umount command-line tools.
//!
//! All volume state lives outside this process, so every query and change
//! here is a named resource handle passed to an external command. Keeping
//! the invocations in one place lets the stages read as intent rather than
//! argument vectors.

use anyhow::{bail, Result};
use std::path::Path;

use crate::process::Cmd;

/// Name of the dataset currently mounted at `/`.
pub fn root_dataset() -> Result<String> {
    let result = Cmd::new("zfs").args(["list", "-H", "-o", "name", "/"]).run()?;
    let name = result.stdout.lines().next().unwrap_or("").trim();
    if name.is_empty() {
        bail!("zfs did not report a dataset for /");
    }
    Ok(name.to_string())
}

/// Whether a dataset exists.
pub fn exists(dataset: &str) -> Result<bool> {
    let result = Cmd::new("zfs")
        .args(["list", dataset])
        .allow_fail()
        .run()?;
    Ok(result.success())
}

/// Read one property value; `None` when the property is unset.
pub fn get(dataset: &str, property: &str) -> Result<Option<String>> {
    let result = Cmd::new("zfs")
        .args(["get", "-H", "-o", "value", property, dataset])
        .run()?;
    let value = result.stdout_trimmed();
    if value.is_empty() || value == "-" {
        Ok(None)
    } else {
        Ok(Some(value.to_string()))
    }
}

/// Set one property.
pub fn set(dataset: &str, property: &str, value: &str) -> Result<()> {
    Cmd::new("zfs")
        .arg("set")
        .arg(format!("{}={}", property, value))
        .arg(dataset)
        .run()?;
    Ok(())
}

/// Clear a property back to its inherited value.
pub fn inherit(dataset: &str, property: &str) -> Result<()> {
    Cmd::new("zfs")
        .args(["inherit", property, dataset])
        .run()?;
    Ok(())
}

/// Create a dataset with the given properties.
pub fn create(dataset: &str, properties: &[(&str, &str)]) -> Result<()> {
    let mut cmd = Cmd::new("zfs").arg("create");
    for (property, value) in properties {
        cmd = cmd.arg("-o").arg(format!("{}={}", property, value));
    }
    cmd.arg(dataset).run()?;
    Ok(())
}

/// Destroy a dataset and all of its descendants, unmounting as needed.
pub fn destroy_recursive(dataset: &str) -> Result<()> {
    Cmd::new("zfs")
        .args(["destroy", "-r", "-f", dataset])
        .run()?;
    Ok(())
}

/// Destroy one dataset, unmounting it first if mounted.
pub fn destroy_force(dataset: &str) -> Result<()> {
    Cmd::new("zfs").args(["destroy", "-f", dataset]).run()?;
    Ok(())
}

/// Mount a dataset at its configured mountpoint.
pub fn mount(dataset: &str) -> Result<()> {
    Cmd::new("zfs").args(["mount", dataset]).run()?;
    Ok(())
}

/// Unmount a dataset.
pub fn unmount(dataset: &str) -> Result<()> {
    Cmd::new("zfs").args(["umount", dataset]).run()?;
    Ok(())
}

/// Change a dataset's mountpoint property.
pub fn set_mountpoint(dataset: &str, mountpoint: &str) -> Result<()> {
    set(dataset, "mountpoint", mountpoint)
}

/// Mount a `mountpoint=legacy` dataset at an explicit path.
pub fn mount_legacy(dataset: &str, target: &Path) -> Result<()> {
    Cmd::new("mount")
        .args(["-F", "zfs", dataset])
        .arg(target)
        .run()?;
    Ok(())
}

/// Unmount whatever is mounted at a path.
pub fn unmount_path(target: &Path) -> Result<()> {
    Cmd::new("umount").arg(target).run()?;
    Ok(())
}

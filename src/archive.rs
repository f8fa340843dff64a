//! The on-disk contract of an unpacked upgrade archive.
//!
//! An archive is a plain directory: a version descriptor, a compressed root
//! filesystem payload, a `boot/` directory of kernel and initial-filesystem
//! images, and an optional checksum manifest. Everything here is read-only
//! with respect to the archive.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::MigrationError;

/// Version descriptor file at the archive root.
pub const VERSION_INFO: &str = "version.info";
/// Compressed root filesystem payload.
pub const ROOTFS_ARCHIVE: &str = "rootfs.tar.gz";
/// Optional checksum manifest covering archive files.
pub const CHECKSUM_MANIFEST: &str = "SHA256SUMS";
/// Boot image directory inside the archive.
pub const BOOT_SUBDIR: &str = "boot";
/// Kernel image name prefix.
pub const KERNEL_PREFIX: &str = "vmlinuz-";
/// Initial filesystem image name prefix.
pub const INITRD_PREFIX: &str = "initrd.img-";

/// An opened, structurally valid upgrade archive.
#[derive(Debug, Clone)]
pub struct UpgradeArchive {
    /// Archive root directory.
    pub dir: PathBuf,
    /// `DLPX_VERSION`: the version the new environment will carry.
    pub version: String,
    /// `DLPX_MIN_VERSION`: the floor this archive supports migrating from.
    pub min_version: String,
}

impl UpgradeArchive {
    /// Open an archive directory and validate its structure.
    ///
    /// Checks the descriptor, the payload, and the boot images, and verifies
    /// the checksum manifest when one is present.
    pub fn open(dir: &Path) -> std::result::Result<Self, MigrationError> {
        let invalid = |reason: String| MigrationError::ArchiveInvalid(reason);

        if !dir.is_dir() {
            return Err(invalid(format!("{} is not a directory", dir.display())));
        }

        let info_path = dir.join(VERSION_INFO);
        let info = fs::read_to_string(&info_path)
            .map_err(|e| invalid(format!("cannot read {}: {}", info_path.display(), e)))?;
        let (version, min_version) = parse_version_info(&info);
        if version.is_empty() {
            return Err(invalid(format!("{} does not define DLPX_VERSION", VERSION_INFO)));
        }

        if !dir.join(ROOTFS_ARCHIVE).is_file() {
            return Err(invalid(format!("missing {}", ROOTFS_ARCHIVE)));
        }

        let archive = Self {
            dir: dir.to_path_buf(),
            version,
            min_version,
        };
        archive
            .kernel_image()
            .map_err(|e| invalid(format!("{:#}", e)))?;
        archive
            .initrd_image()
            .map_err(|e| invalid(format!("{:#}", e)))?;

        if dir.join(CHECKSUM_MANIFEST).is_file() {
            verify_checksums(dir)?;
        }

        Ok(archive)
    }

    /// Path of the compressed root filesystem payload.
    pub fn rootfs_archive(&self) -> PathBuf {
        self.dir.join(ROOTFS_ARCHIVE)
    }

    /// Path of the boot image directory.
    pub fn boot_dir(&self) -> PathBuf {
        self.dir.join(BOOT_SUBDIR)
    }

    /// The kernel image to install. With several candidates, the
    /// lexicographically greatest name wins.
    pub fn kernel_image(&self) -> Result<PathBuf> {
        newest_image(&self.boot_dir(), KERNEL_PREFIX)
    }

    /// The initial filesystem image to install, picked like the kernel.
    pub fn initrd_image(&self) -> Result<PathBuf> {
        newest_image(&self.boot_dir(), INITRD_PREFIX)
    }
}

/// Pull `DLPX_VERSION` and `DLPX_MIN_VERSION` out of a descriptor.
///
/// The descriptor is KEY=VALUE lines; quotes are stripped and `#` comments
/// skipped. Unknown keys are ignored so descriptors can grow fields.
fn parse_version_info(content: &str) -> (String, String) {
    let mut version = String::new();
    let mut min_version = String::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "DLPX_VERSION" => version = value.to_string(),
                "DLPX_MIN_VERSION" => min_version = value.to_string(),
                _ => {}
            }
        }
    }

    (version, min_version)
}

/// Find the image with the given name prefix, taking the lexicographically
/// greatest name when more than one matches.
fn newest_image(boot_dir: &Path, prefix: &str) -> Result<PathBuf> {
    let entries = fs::read_dir(boot_dir)
        .with_context(|| format!("cannot read {}", boot_dir.display()))?;

    let mut best: Option<String> = None;
    for entry in entries {
        let entry = entry.with_context(|| format!("cannot read {}", boot_dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && best.as_deref().map_or(true, |b| name.as_str() > b) {
            best = Some(name);
        }
    }

    match best {
        Some(name) => Ok(boot_dir.join(name)),
        None => anyhow::bail!(
            "no {}* image under {}",
            prefix,
            boot_dir.display()
        ),
    }
}

/// Verify every file listed in the checksum manifest.
fn verify_checksums(dir: &Path) -> std::result::Result<(), MigrationError> {
    let invalid = |reason: String| MigrationError::ArchiveInvalid(reason);

    let manifest_path = dir.join(CHECKSUM_MANIFEST);
    let manifest = fs::read_to_string(&manifest_path)
        .map_err(|e| invalid(format!("cannot read {}: {}", CHECKSUM_MANIFEST, e)))?;

    for line in manifest.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((expected, name)) = line.split_once(char::is_whitespace) else {
            return Err(invalid(format!("malformed {} line: {}", CHECKSUM_MANIFEST, line)));
        };
        let name = name.trim().trim_start_matches('*');
        if name.is_empty() || name.split('/').any(|part| part == "..") {
            return Err(invalid(format!("unsafe {} entry: {}", CHECKSUM_MANIFEST, line)));
        }

        let path = dir.join(name);
        let actual = sha256_file(&path)
            .map_err(|e| invalid(format!("cannot hash {}: {:#}", name, e)))?;
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(invalid(format!("checksum mismatch for {}", name)));
        }
    }

    Ok(())
}

/// SHA-256 of a file as lowercase hex, streamed in chunks.
fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let n = file
            .read(&mut buffer)
            .with_context(|| format!("cannot read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

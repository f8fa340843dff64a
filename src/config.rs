//! Runtime configuration.
//!
//! The handful of host paths the provisioner touches can be overridden
//! through the environment (or a `.env` file loaded by the binary), which is
//! how the integration tests sandbox the tool onto a temp directory.
//! Production runs use the defaults.

use std::env;
use std::path::PathBuf;

/// Default boot loader directory on the running system.
pub const DEFAULT_BOOT_DIR: &str = "/boot";
/// Default parent directory for transient working directories.
pub const DEFAULT_TMP_DIR: &str = "/var/tmp";
/// Loader menu configuration file inside the boot directory.
pub const BOOT_MENU_FILE: &str = "menu.rc.local";

/// Host paths for a provisioning run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where kernel/initrd images and the loader menu live.
    pub boot_dir: PathBuf,
    /// Parent directory for per-run working directories.
    pub tmp_dir: PathBuf,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn load() -> Self {
        Self {
            boot_dir: path_from_env("MIGRATION_BOOT_DIR", DEFAULT_BOOT_DIR),
            tmp_dir: path_from_env("MIGRATION_TMP_DIR", DEFAULT_TMP_DIR),
        }
    }

    /// Path of the loader menu configuration file.
    pub fn boot_menu_path(&self) -> PathBuf {
        self.boot_dir.join(BOOT_MENU_FILE)
    }
}

fn path_from_env(var: &str, default: &str) -> PathBuf {
    match env::var(var) {
        Ok(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(default),
    }
}

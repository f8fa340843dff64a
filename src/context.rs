//! Run-wide context: everything validation learns, computed once and shared
//! read-only by the later stages.

use std::path::PathBuf;
use uuid::Uuid;

use crate::archive::UpgradeArchive;
use crate::config::Config;
use crate::version::Version;

/// Fixed name of the migration-owned container dataset under the pool.
pub const CONTAINER_NAME: &str = "os-root";
/// Name prefix of the versioned instance container.
pub const INSTANCE_PREFIX: &str = "delphix.";
/// Name prefix of transient working directories under the tmp root.
pub const WORKDIR_PREFIX: &str = "delphix.migration.";
/// Dataset under the pool reserved for crash dumps.
pub const CRASHDUMP_NAME: &str = "crashdump";

/// Instance property recording the version first installed.
pub const PROP_INITIAL_VERSION: &str = "com.delphix:initial-version";
/// Instance property recording the version currently installed.
pub const PROP_CURRENT_VERSION: &str = "com.delphix:current-version";

/// Everything a stage needs to know about the run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Host paths, from the environment.
    pub config: Config,
    /// The validated upgrade archive.
    pub archive: UpgradeArchive,
    /// Version of the system we are migrating away from.
    pub running_version: Version,
    /// Pool hosting the running system's root dataset.
    pub pool: String,
    /// Short unique token naming this run's instance and working directory.
    pub run_token: String,
}

impl RunContext {
    pub fn new(
        config: Config,
        archive: UpgradeArchive,
        running_version: Version,
        pool: String,
    ) -> Self {
        Self {
            config,
            archive,
            running_version,
            pool,
            run_token: new_run_token(),
        }
    }

    /// The container dataset, e.g. `domain0/os-root`.
    pub fn container(&self) -> String {
        format!("{}/{}", self.pool, CONTAINER_NAME)
    }

    /// This run's instance container, e.g. `domain0/os-root/delphix.3fa81c02`.
    pub fn instance(&self) -> String {
        format!("{}/{}{}", self.container(), INSTANCE_PREFIX, self.run_token)
    }

    /// A leaf volume of this run's instance.
    pub fn dataset(&self, leaf: &str) -> String {
        format!("{}/{}", self.instance(), leaf)
    }

    /// The pool-level crash dump dataset.
    pub fn crashdump_dataset(&self) -> String {
        format!("{}/{}", self.pool, CRASHDUMP_NAME)
    }

    /// This run's working directory under the tmp root.
    pub fn workdir(&self) -> PathBuf {
        self.config
            .tmp_dir
            .join(format!("{}{}", WORKDIR_PREFIX, self.run_token))
    }

    /// Transient mount point of the new environment's root volume.
    pub fn transient_root(&self) -> PathBuf {
        self.workdir().join("root")
    }
}

/// Eight hex characters of a fresh UUID, distinguishing this run's instance
/// and working directory from any leftovers.
fn new_run_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}

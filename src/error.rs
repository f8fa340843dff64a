//! Error taxonomy for the migration provisioner.

use thiserror::Error;

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Failures the provisioner can abort with.
///
/// Every failure is fatal and immediate; there is no retry or rollback
/// within a run. Recovery is re-invocation, which converges through the
/// cleanup stage.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The upgrade archive directory is missing, unreadable, or malformed.
    #[error("invalid upgrade archive: {0}")]
    ArchiveInvalid(String),

    /// The archive declares a migration floor this tool does not support.
    #[error("archive declares minimum version {found:?}, expected {expected}")]
    VersionFloorMismatch { expected: &'static str, found: String },

    /// The running system is outside the band this archive can migrate.
    #[error("running version {running} cannot migrate to this archive (requires {floor} or a newer patch of it)")]
    UnsupportedRunningVersion { running: String, floor: String },

    /// An external command the pipeline shells out to is not installed.
    #[error("required tool not found: {0}")]
    MissingTool(String),

    /// Leftover state from a prior run could not be removed.
    #[error("cleanup of leftover migration state failed: {0}")]
    CleanupFailed(String),

    /// A dataset in the new hierarchy could not be created.
    #[error("failed to create {name}: {reason}")]
    VolumeCreateFailed { name: String, reason: String },

    /// A volume could not be mounted at its transient location.
    #[error("failed to mount {name}: {reason}")]
    VolumeMountFailed { name: String, reason: String },

    /// The root filesystem payload did not extract cleanly.
    #[error("failed to unpack root filesystem: {0}")]
    UnpackFailed(String),

    /// The running system's identity could not be carried over.
    #[error("failed to carry over host identity: {0}")]
    IdentityCopyFailed(String),

    /// Boot images or the loader menu entry could not be installed.
    #[error("failed to install boot entry: {0}")]
    BootInstallFailed(String),

    /// The data area contains entries the payload must never provide.
    #[error("unexpected data found under {0}")]
    UnexpectedDataFound(String),

    /// Post-provisioning verification or teardown failed.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

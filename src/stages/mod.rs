//! The provisioning pipeline: ordered stages, fatal on first failure.
//!
//! Validation runs first and produces the [`RunContext`] every later stage
//! shares. No stage is retried; recovery is re-running the tool, which
//! converges because the cleanup stage removes whatever a prior attempt
//! left behind.

pub mod bootmenu;
pub mod cleanup;
pub mod finalize;
pub mod identity;
pub mod unpack;
pub mod validate;
pub mod volumes;

use std::fmt;
use std::path::Path;

use crate::config::Config;
use crate::context::RunContext;
use crate::error::MigrationError;

/// One stage of the pipeline.
pub struct Stage {
    pub name: &'static str,
    run: fn(&RunContext) -> Result<(), MigrationError>,
}

impl Stage {
    pub fn execute(&self, ctx: &RunContext) -> Result<(), MigrationError> {
        (self.run)(ctx)
    }
}

/// The stages executed after validation, in order.
pub const PIPELINE: &[Stage] = &[
    Stage {
        name: "cleanup",
        run: cleanup::run,
    },
    Stage {
        name: "create-volumes",
        run: volumes::run,
    },
    Stage {
        name: "unpack",
        run: unpack::run,
    },
    Stage {
        name: "host-identity",
        run: identity::run,
    },
    Stage {
        name: "boot-menu",
        run: bootmenu::run,
    },
    Stage {
        name: "finalize",
        run: finalize::run,
    },
];

/// A stage failure, tagged with the stage that raised it.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: &'static str,
    pub error: MigrationError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Run the whole migration against an upgrade archive directory.
pub fn run_migration(config: &Config, archive_dir: &Path) -> Result<(), StageFailure> {
    let ctx = validate::run(config, archive_dir).map_err(|error| StageFailure {
        stage: "validate",
        error,
    })?;

    for stage in PIPELINE {
        stage.execute(&ctx).map_err(|error| StageFailure {
            stage: stage.name,
            error,
        })?;
    }

    Ok(())
}

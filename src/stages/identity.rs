//! Host identity carry-over.
//!
//! The new environment must present the same host id as the running system;
//! the pool remembers which host last imported it, and a mismatch at first
//! boot would look like a foreign import. Linux and illumos derive host ids
//! differently, so the id is captured here and pinned in the unpacked tree
//! rather than left for the new kernel to compute.

use std::fs;

use crate::context::RunContext;
use crate::error::MigrationError;
use crate::process::Cmd;

/// Where the pinned id lands, relative to the unpacked root.
pub const HOSTID_FILE: &str = "etc/hostid";

pub fn run(ctx: &RunContext) -> Result<(), MigrationError> {
    let failed = |reason: String| MigrationError::IdentityCopyFailed(reason);

    let result = Cmd::new("hostid")
        .run()
        .map_err(|e| failed(format!("{:#}", e)))?;
    let hostid = result.stdout_trimmed();
    if hostid.is_empty() {
        return Err(failed("hostid produced no output".to_string()));
    }

    let path = ctx.transient_root().join(HOSTID_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| failed(format!("cannot create {}: {}", parent.display(), e)))?;
    }
    fs::write(&path, format!("{}\n", hostid))
        .map_err(|e| failed(format!("cannot write {}: {}", path.display(), e)))?;

    println!("Carried over host identity {}", hostid);
    Ok(())
}

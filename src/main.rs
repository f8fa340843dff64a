//! dlpx-migration: provision the Linux boot environment for an appliance
//! migration.
//!
//! Runs a linear pipeline against an unpacked upgrade archive: validate,
//! clean up anything a prior attempt left, create the dataset hierarchy,
//! unpack the payload, carry over host identity, install the boot menu
//! entry, then verify and tear down. Any stage failure aborts the run;
//! re-running converges through the cleanup stage.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use dlpx_migration::config::Config;
use dlpx_migration::stages;

#[derive(Parser)]
#[command(name = "dlpx-migration")]
#[command(about = "Provision the Linux migration boot environment from an upgrade archive")]
struct Cli {
    /// Directory holding the unpacked upgrade archive
    archive: PathBuf,
}

fn main() -> ExitCode {
    // Usage problems (including help) exit 2; stage failures exit 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(2);
        }
    };

    dotenvy::dotenv().ok();
    let config = Config::load();

    match stages::run_migration(&config, &cli.archive) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("dlpx-migration: {}", failure);
            ExitCode::from(1)
        }
    }
}

//! dlpx-migration-hold: pause/resume synchronization for migration test
//! harnesses.
//!
//! Wraps the hold property so harness scripts on either side of a
//! migration can stop and release each other without sharing anything but
//! the pool. The wait commands poll once per second and never time out.

use anyhow::Result;
use clap::{Parser, Subcommand};

use dlpx_migration::holdpoint;

#[derive(Parser)]
#[command(name = "dlpx-migration-hold")]
#[command(about = "Set, clear, and wait on the migration hold flag of a dataset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Raise the hold flag on a dataset
    Hold { dataset: String },
    /// Clear the hold flag
    Release { dataset: String },
    /// Block until the hold flag is raised
    WaitHeld { dataset: String },
    /// Block until the hold flag is cleared
    WaitReleased { dataset: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Hold { dataset } => holdpoint::hold(&dataset),
        Commands::Release { dataset } => holdpoint::release(&dataset),
        Commands::WaitHeld { dataset } => holdpoint::wait_held(&dataset),
        Commands::WaitReleased { dataset } => holdpoint::wait_released(&dataset),
    }
}

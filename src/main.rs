//! dualroot-upgrade - A/B root filesystem upgrade client.
//!
//! Installs a firmware package onto the backup root of a dual-root device:
//! - reads and validates the package manifest
//! - verifies every blob's MD5 digest
//! - installs bootloader, kernel and rootfs through device hooks

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dualroot_upgrade::config::Config;

#[derive(Parser)]
#[command(name = "dualroot-upgrade")]
#[command(about = "A/B root filesystem upgrade client")]
#[command(
    after_help = "QUICK START:\n  dualroot-upgrade preflight        Check the device is ready\n  dualroot-upgrade inspect PKG      Show what a package contains\n  dualroot-upgrade apply PKG        Install PKG to the backup root"
)]
struct Cli {
    /// Configuration file (default: .env in the current directory)
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package to the backup root
    Apply {
        /// Package archive
        package: PathBuf,
    },

    /// Print a package manifest
    Inspect {
        /// Package archive
        package: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check every blob of a package against its checksum
    Verify {
        /// Package archive
        package: PathBuf,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Run preflight checks (verify the device is ready before upgrading)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Remove staging directories left by interrupted upgrades
    Clean,
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show active and backup roots
    Partitions,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = if verbose {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(&cli.env_file)?;

    match cli.command {
        Commands::Apply { package } => {
            commands::cmd_apply(&package, &config)?;
        }

        Commands::Inspect { package, json } => {
            commands::cmd_inspect(&package, json, &config)?;
        }

        Commands::Verify { package } => {
            commands::cmd_verify(&package, &config)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Partitions => commands::show::ShowTarget::Partitions,
            };
            commands::cmd_show(show_target, &config)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Clean => {
            commands::cmd_clean(&config)?;
        }
    }

    Ok(())
}

//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `apply` - Run an upgrade
//! - `inspect` - Print a package manifest
//! - `verify` - Check every blob checksum of a package
//! - `show` - Display information
//! - `preflight` - Run preflight checks
//! - `clean` - Remove stale staging directories

mod apply;
mod clean;
mod inspect;
mod preflight;
pub mod show;
mod verify;

pub use apply::cmd_apply;
pub use clean::cmd_clean;
pub use inspect::cmd_inspect;
pub use preflight::cmd_preflight;
pub use show::cmd_show;
pub use verify::cmd_verify;

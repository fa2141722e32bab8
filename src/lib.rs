//! Dual-root (A/B) firmware upgrade client.
//!
//! A package is a compressed tarball holding `manifest.json` and the blobs it
//! lists. An upgrade reads and validates the manifest, checks that the package
//! targets this device, picks the inactive root of the A/B pair and installs
//! every blob there after checking its MD5 digest. The running root is never
//! written.
//!
//! The pieces, bottom up:
//! - [`package`] - manifest model and reader
//! - [`verify`] - MD5 integrity checks
//! - [`partition`] - active and backup root discovery
//! - [`upgrade`] - the orchestrating state machine
//!
//! with [`archive`], [`install`] and [`staging`] as the seams to the host.

pub mod archive;
pub mod config;
pub mod error;
pub mod install;
pub mod lock;
pub mod package;
pub mod partition;
pub mod preflight;
pub mod process;
pub mod staging;
pub mod upgrade;
pub mod verify;

//! Preflight checks for an upgrade.
//!
//! Before touching a partition, make sure the host can open packages and the
//! device is wired up to install them: identity, root pairing, staging space
//! and install hooks. Run with `dualroot-upgrade preflight`.

mod environment;
mod host_tools;

use std::fmt;
use std::io::{self, Write};

use anyhow::{bail, Result};
use tracing::info;

use crate::config::Config;
use crate::partition::PartitionLocator;

/// Which part of the setup a check looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Area {
    Host,
    Device,
    Hooks,
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Area::Host => "host tools",
            Area::Device => "device",
            Area::Hooks => "install hooks",
        })
    }
}

/// How a single check affects an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Some packages will fail, others are fine.
    Degraded,
    /// No upgrade can succeed until this is fixed.
    Blocked,
    NotNeeded,
}

impl Readiness {
    fn label(self) -> &'static str {
        match self {
            Readiness::Ready => "ok",
            Readiness::Degraded => "degraded",
            Readiness::Blocked => "BLOCKED",
            Readiness::NotNeeded => "n/a",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Check {
    pub area: Area,
    pub name: String,
    pub readiness: Readiness,
    pub detail: String,
}

impl Check {
    fn new(area: Area, name: impl Into<String>, readiness: Readiness, detail: impl Into<String>) -> Self {
        Self {
            area,
            name: name.into(),
            readiness,
            detail: detail.into(),
        }
    }

    pub fn ready(area: Area, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(area, name, Readiness::Ready, detail)
    }

    pub fn degraded(area: Area, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(area, name, Readiness::Degraded, detail)
    }

    pub fn blocked(area: Area, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(area, name, Readiness::Blocked, detail)
    }

    pub fn not_needed(area: Area, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(area, name, Readiness::NotNeeded, detail)
    }
}

/// Every check from one preflight run.
#[derive(Debug, Default)]
pub struct ReadinessReport {
    pub checks: Vec<Check>,
}

impl ReadinessReport {
    /// Checks that stop every upgrade.
    pub fn blockers(&self) -> impl Iterator<Item = &Check> {
        self.checks
            .iter()
            .filter(|c| c.readiness == Readiness::Blocked)
    }

    pub fn is_ready(&self) -> bool {
        self.blockers().next().is_none()
    }

    /// Write the report grouped by area, then a one-line verdict.
    pub fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut checks: Vec<&Check> = self.checks.iter().collect();
        checks.sort_by_key(|c| c.area);

        let mut area = None;
        for check in checks {
            if area != Some(check.area) {
                writeln!(out, "[{}]", check.area)?;
                area = Some(check.area);
            }
            writeln!(
                out,
                "  {:<9} {}: {}",
                check.readiness.label(),
                check.name,
                check.detail
            )?;
        }

        let blocked = self.blockers().count();
        let degraded = self
            .checks
            .iter()
            .filter(|c| c.readiness == Readiness::Degraded)
            .count();
        writeln!(out)?;
        if blocked > 0 {
            writeln!(out, "Not ready: {} blocker(s), {} degraded", blocked, degraded)
        } else if degraded > 0 {
            writeln!(out, "Ready with {} degraded check(s)", degraded)
        } else {
            writeln!(out, "Ready to upgrade")
        }
    }

    pub fn print(&self) -> io::Result<()> {
        self.render(&mut io::stdout().lock())
    }
}

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> ReadinessReport {
    let locator = PartitionLocator::new(&config.cmdline, config.root_pairs.clone());
    let mut report = ReadinessReport::default();

    info!("checking host tools");
    report
        .checks
        .extend(host_tools::check_host_tools(config.compression));

    info!("checking device environment");
    report
        .checks
        .extend(environment::check_environment(config, &locator));

    report
}

/// Run preflight, print the report and bail on any blocker.
pub fn require_ready(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print()?;

    let blockers: Vec<&str> = report.blockers().map(|c| c.name.as_str()).collect();
    if !blockers.is_empty() {
        bail!("Preflight failed: {}", blockers.join(", "));
    }
    Ok(())
}

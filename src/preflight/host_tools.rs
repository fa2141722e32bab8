//! Host tool availability checks.

use crate::archive::Compression;
use crate::process;

use super::{Area, Check};

/// Check the tools needed to open packages are installed.
pub fn check_host_tools(compression: Compression) -> Vec<Check> {
    let decompressor = match compression.filter() {
        Some(filter) => check_tool(filter, "needed to decompress upgrade packages"),
        None => Check::not_needed(Area::Host, "decompressor", "packages are not compressed"),
    };
    vec![check_tool("tar", "needed to read upgrade packages"), decompressor]
}

/// Every host tool is required: without it no package can be opened.
fn check_tool(tool: &str, purpose: &str) -> Check {
    match process::which(tool) {
        Some(path) => Check::ready(Area::Host, tool, path.display().to_string()),
        None => Check::blocked(Area::Host, tool, format!("not found in PATH, {}", purpose)),
    }
}

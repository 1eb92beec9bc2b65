//! Physical memory detection for the static-asset build decision.

use std::path::Path;

use crate::error::{Result, UpgradeError};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Total physical memory in bytes, read from a `/proc/meminfo`-format file.
pub fn total_memory_bytes(meminfo: &Path) -> Result<u64> {
    let contents = std::fs::read_to_string(meminfo)?;
    parse_mem_total(&contents)
}

pub fn parse_mem_total(contents: &str) -> Result<u64> {
    let line = contents
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .ok_or_else(|| UpgradeError::MemInfo("MemTotal not found".to_string()))?;
    line.split_whitespace()
        .nth(1)
        .and_then(|kib| kib.parse::<u64>().ok())
        .map(|kib| kib * 1024)
        .ok_or_else(|| UpgradeError::MemInfo(format!("invalid meminfo line: {line}")))
}

pub fn format_gib(bytes: u64) -> String {
    format!("{:.1} GiB", bytes as f64 / GIB)
}

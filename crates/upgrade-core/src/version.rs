//! Version markers recorded inside each deployment.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::paths;

static ASSIGNMENT_RE: OnceLock<Regex> = OnceLock::new();

fn assignment_re() -> &'static Regex {
    ASSIGNMENT_RE.get_or_init(|| {
        Regex::new(r#"^\s*[A-Z_]*VERSION\s*[:=]\s*["']([^"']+)["']"#).unwrap()
    })
}

/// Read the version recorded in `deployment`. Returns `None` when the
/// marker file is absent.
///
/// The marker is either a bare version string or a source file with a
/// `..._VERSION = "x.y"` assignment.
pub fn read_version(deployment: &Path, marker: &str) -> Result<Option<String>> {
    let path = paths::version_marker_path(deployment, marker);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(parse_version(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn parse_version(contents: &str) -> Option<String> {
    if let Some(caps) = contents.lines().find_map(|l| assignment_re().captures(l)) {
        return Some(caps[1].to_string());
    }
    contents
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
}

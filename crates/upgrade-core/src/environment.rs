//! Process environment normalization and privilege checks.

use crate::error::{Result, UpgradeError};

pub const LOCALE: &str = "C.UTF-8";
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
pub const UMASK: u32 = 0o022;

/// Environment overrides applied to every external step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(String, String)>,
    search_path: String,
}

impl Environment {
    pub fn normalized(search_path: &str) -> Self {
        let vars = vec![
            ("LC_ALL".to_string(), LOCALE.to_string()),
            ("LANG".to_string(), LOCALE.to_string()),
            ("LANGUAGE".to_string(), LOCALE.to_string()),
            ("TZ".to_string(), "UTC".to_string()),
            ("PATH".to_string(), search_path.to_string()),
        ];
        Self {
            vars,
            search_path: search_path.to_string(),
        }
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    pub fn search_path(&self) -> &str {
        &self.search_path
    }
}

pub fn effective_uid() -> u32 {
    // SAFETY: geteuid(2) cannot fail and touches no memory.
    unsafe { libc::geteuid() }
}

pub fn check_privileges(require_root: bool) -> Result<()> {
    if !require_root {
        return Ok(());
    }
    let uid = effective_uid();
    if uid != 0 {
        return Err(UpgradeError::NotPrivileged(uid));
    }
    Ok(())
}

/// Set the process file-creation mask to [`UMASK`]; children inherit it.
/// Returns the previous mask.
pub fn restrict_umask() -> u32 {
    // SAFETY: umask(2) cannot fail and touches no memory.
    let previous = unsafe { libc::umask(UMASK as libc::mode_t) };
    previous as u32
}

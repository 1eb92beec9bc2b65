//! Interpretation of the read-only dry-run probes.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::config::PuppetExitCodes;

// ---------------------------------------------------------------------------
// PuppetCheck
// ---------------------------------------------------------------------------

/// Result of the configuration-management dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PuppetCheck {
    NoChanges,
    ChangesPending,
    Failed { code: i32 },
}

impl PuppetCheck {
    pub fn classify(code: i32, contract: &PuppetExitCodes) -> Self {
        if contract.no_changes.contains(&code) {
            PuppetCheck::NoChanges
        } else if contract.changes_pending.contains(&code) {
            PuppetCheck::ChangesPending
        } else {
            PuppetCheck::Failed { code }
        }
    }
}

// ---------------------------------------------------------------------------
// Migrations
// ---------------------------------------------------------------------------

static PENDING_RE: OnceLock<Regex> = OnceLock::new();
static APP_RE: OnceLock<Regex> = OnceLock::new();

fn pending_re() -> &'static Regex {
    PENDING_RE.get_or_init(|| Regex::new(r"^\s+\[ \]\s+(\S+)").unwrap())
}

fn app_re() -> &'static Regex {
    APP_RE.get_or_init(|| Regex::new(r"^([A-Za-z_][\w.]*)\s*$").unwrap())
}

/// Pending migrations in a migration listing, as `app.migration`.
///
/// The listing groups migrations under unindented app labels; applied
/// entries are marked `[X]` and pending ones `[ ]`.
pub fn pending_migrations(listing: &str) -> Vec<String> {
    let mut app: Option<&str> = None;
    let mut pending = Vec::new();
    for line in listing.lines() {
        if let Some(caps) = app_re().captures(line) {
            app = caps.get(1).map(|m| m.as_str());
        } else if let Some(caps) = pending_re().captures(line) {
            let name = &caps[1];
            pending.push(match app {
                Some(app) => format!("{app}.{name}"),
                None => name.to_string(),
            });
        }
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_default_contract() {
        let contract = PuppetExitCodes::default();
        assert_eq!(PuppetCheck::classify(0, &contract), PuppetCheck::NoChanges);
        assert_eq!(
            PuppetCheck::classify(1, &contract),
            PuppetCheck::ChangesPending
        );
        assert_eq!(
            PuppetCheck::classify(2, &contract),
            PuppetCheck::Failed { code: 2 }
        );
        assert_eq!(
            PuppetCheck::classify(-1, &contract),
            PuppetCheck::Failed { code: -1 }
        );
    }

    #[test]
    fn classify_detailed_exitcodes_contract() {
        let contract = PuppetExitCodes {
            no_changes: vec![0],
            changes_pending: vec![2],
        };
        assert_eq!(
            PuppetCheck::classify(2, &contract),
            PuppetCheck::ChangesPending
        );
        assert_eq!(
            PuppetCheck::classify(4, &contract),
            PuppetCheck::Failed { code: 4 }
        );
    }

    #[test]
    fn finds_pending_migrations_per_app() {
        let listing = "\
analytics
 [X] 0001_initial
 [X] 0002_messagecount
auth
 [X] 0001_initial
messages
 [X] 0001_initial
 [ ] 0500_add_index
 [ ] 0501_backfill
";
        assert_eq!(
            pending_migrations(listing),
            vec!["messages.0500_add_index", "messages.0501_backfill"]
        );
    }

    #[test]
    fn fully_applied_listing_has_nothing_pending() {
        let listing = "app\n [X] 0001_initial\n [X] 0002_more\n";
        assert!(pending_migrations(listing).is_empty());
        assert!(pending_migrations("").is_empty());
    }

    #[test]
    fn no_migrations_marker_is_ignored() {
        let listing = "sessions\n (no migrations)\n";
        assert!(pending_migrations(listing).is_empty());
    }
}

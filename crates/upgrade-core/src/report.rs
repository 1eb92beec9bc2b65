use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::ChangePlan;
use crate::step::{Step, StepKind, StepOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The new deployment is live.
    Upgraded,
    /// Unattended run: nothing disruptive was needed, the deployment is staged.
    Staged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: StepKind,
    pub command: String,
    /// `None` for steps started in the background.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Everything an operator needs to reconstruct what a run did.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub deployment: PathBuf,
    pub from_version: Option<String>,
    pub to_version: Option<String>,
    pub unattended: bool,
    #[serde(flatten)]
    pub plan: ChangePlan,
    pub puppet_applied: bool,
    pub migrations_applied: bool,
    pub restarted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Configuration diff that was detected but deliberately not applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unapplied_puppet_diff: Option<String>,
    pub steps: Vec<StepRecord>,
}

impl UpgradeReport {
    pub fn new(deployment: PathBuf, unattended: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            deployment,
            from_version: None,
            to_version: None,
            unattended,
            plan: ChangePlan::default(),
            puppet_applied: false,
            migrations_applied: false,
            restarted: false,
            outcome: None,
            unapplied_puppet_diff: None,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: &Step, output: &StepOutput) {
        self.steps.push(StepRecord {
            step: step.kind,
            command: step.command_line(),
            exit_code: Some(output.code),
            duration_ms: output.duration_ms,
        });
    }

    pub fn record_background(&mut self, step: &Step) {
        self.steps.push(StepRecord {
            step: step.kind,
            command: step.command_line(),
            exit_code: None,
            duration_ms: 0,
        });
    }

    pub fn finish(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    pub fn ran(&self, kind: StepKind) -> bool {
        self.steps.iter().any(|s| s.step == kind)
    }
}

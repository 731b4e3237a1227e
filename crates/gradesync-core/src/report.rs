//! Structured mismatch report for one run.
//!
//! Sections always appear in the same order and each lists its lines in
//! the order the engine produced them (roster order for source lines,
//! snapshot order for target lines).

use crate::contamination::{ChangeKind, ContaminationWarning};
use crate::error::RecordFailure;
use crate::executor::UpdateOutcome;
use crate::record::{
    PositionalHandle, SourceUnmatchedReason, TargetUnmatchedReason, UnmatchedSourceRecord,
    UnmatchedTargetRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOnlyLine {
    pub serial: String,
    pub id: String,
    pub name: String,
    pub reason: SourceUnmatchedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOnlyLine {
    pub id: String,
    pub name: String,
    pub handle: PositionalHandle,
    pub reason: TargetUnmatchedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationFailureLine {
    pub target_id: String,
    pub source_id: String,
    pub failure: RecordFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardFailureLine {
    pub target_id: String,
    pub handle: PositionalHandle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContaminationLine {
    pub target_id: String,
    pub name: String,
    pub kind: ChangeKind,
    pub before: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchReport {
    pub roster_id: String,
    pub generated_at: DateTime<Utc>,
    pub in_source_not_target: Vec<SourceOnlyLine>,
    pub in_target_not_source: Vec<TargetOnlyLine>,
    pub verification_failures: Vec<VerificationFailureLine>,
    pub guard_failures: Vec<GuardFailureLine>,
    pub contamination: Vec<ContaminationLine>,
}

impl MismatchReport {
    pub fn new(roster_id: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            roster_id: roster_id.into(),
            generated_at,
            in_source_not_target: Vec::new(),
            in_target_not_source: Vec::new(),
            verification_failures: Vec::new(),
            guard_failures: Vec::new(),
            contamination: Vec::new(),
        }
    }

    pub fn with_unmatched_source(mut self, records: &[UnmatchedSourceRecord]) -> Self {
        self.in_source_not_target
            .extend(records.iter().map(|unmatched| SourceOnlyLine {
                serial: unmatched.record.serial().to_string(),
                id: unmatched.record.id().to_string(),
                name: unmatched.record.name().to_string(),
                reason: unmatched.reason,
            }));
        self
    }

    pub fn with_unmatched_target(mut self, records: &[UnmatchedTargetRecord]) -> Self {
        self.in_target_not_source
            .extend(records.iter().map(|unmatched| TargetOnlyLine {
                id: unmatched.record.id.clone(),
                name: unmatched.record.name.clone(),
                handle: unmatched.record.positional_handle,
                reason: unmatched.reason,
            }));
        self
    }

    /// File each failed outcome under guard failures or verification failures.
    pub fn with_outcomes(mut self, outcomes: &[UpdateOutcome]) -> Self {
        for outcome in outcomes {
            match &outcome.error {
                None => {}
                Some(RecordFailure::GuardFailure { handle, found, .. }) => {
                    self.guard_failures.push(GuardFailureLine {
                        target_id: outcome.target_id.clone(),
                        handle: *handle,
                        found: found.clone(),
                    });
                }
                Some(failure) => self.verification_failures.push(VerificationFailureLine {
                    target_id: outcome.target_id.clone(),
                    source_id: outcome.source_id.clone(),
                    failure: failure.clone(),
                }),
            }
        }
        self
    }

    pub fn with_contamination(mut self, warnings: &[ContaminationWarning]) -> Self {
        self.contamination
            .extend(warnings.iter().map(|warning| ContaminationLine {
                target_id: warning.target_id.clone(),
                name: warning.name.clone(),
                kind: warning.kind,
                before: warning.before.clone(),
                after: warning.after.clone(),
            }));
        self
    }

    pub fn issue_count(&self) -> usize {
        self.in_source_not_target.len()
            + self.in_target_not_source.len()
            + self.verification_failures.len()
            + self.guard_failures.len()
            + self.contamination.len()
    }

    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }

    /// Human-readable section appended to the report sink.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "==== {} | {} ====",
            self.roster_id,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        section(&mut out, "IN SOURCE BUT NOT IN TARGET", &self.in_source_not_target, |line| {
            format!(
                "serial={} id={} name={} ({})",
                line.serial,
                line.id,
                line.name,
                line.reason.as_str()
            )
        });
        section(&mut out, "IN TARGET BUT NOT IN SOURCE", &self.in_target_not_source, |line| {
            format!(
                "id={} name={} at {} ({})",
                line.id,
                line.name,
                line.handle,
                line.reason.as_str()
            )
        });
        section(&mut out, "VERIFICATION FAILURES", &self.verification_failures, |line| {
            format!("id={} {}", line.target_id, line.failure)
        });
        section(&mut out, "GUARD FAILURES", &self.guard_failures, |line| {
            format!(
                "id={} at {} found {}",
                line.target_id,
                line.handle,
                line.found.as_deref().unwrap_or("<no row>")
            )
        });
        section(&mut out, "CONTAMINATION WARNINGS", &self.contamination, |line| {
            format!(
                "id={} name={} {}: {} -> {}",
                line.target_id,
                line.name,
                line.kind.as_str(),
                line.before,
                line.after.as_deref().unwrap_or("<gone>")
            )
        });
        out
    }
}

fn section<T>(out: &mut String, title: &str, lines: &[T], render: impl Fn(&T) -> String) {
    let _ = writeln!(out, "{title} ({})", lines.len());
    if lines.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for line in lines {
        let _ = writeln!(out, "  - {}", render(line));
    }
}

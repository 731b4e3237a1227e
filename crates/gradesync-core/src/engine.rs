//! Run orchestration: collect, match, revalidate, execute, diff, report.

use crate::contamination::{ContaminationWarning, detect_contamination};
use crate::error::EngineError;
use crate::executor::{UpdateOutcome, execute_plan};
use crate::matcher::match_records;
use crate::record::{PositionalHandle, SourceRecord, TargetRecord, UpdatePlanEntry};
use crate::report::MismatchReport;
use crate::session::Session;
use crate::surface::TargetSurface;
use crate::validator::{HandleCorrection, revalidate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Report key used when no roster id is configured.
pub const DEFAULT_ROSTER_ID: &str = "unnamed-roster";

/// End-of-run counts shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub roster_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_count: usize,
    pub target_count: usize,
    pub matched: usize,
    pub updated: usize,
    pub failed: usize,
    /// Rows whose grade read back as written.
    pub grades_verified: usize,
    /// Rows whose status control read back as wanted, rewritten or not.
    pub statuses_verified: usize,
    pub unmatched_source: usize,
    pub unmatched_target: usize,
    pub corrections: usize,
    pub guard_failures: usize,
    pub contamination_warnings: usize,
    pub status_written: bool,
    /// `None` when no total-marks value was configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_marks_applied: Option<bool>,
    pub snapshot_before: String,
    pub snapshot_after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub plan: Vec<UpdatePlanEntry>,
    pub outcomes: Vec<UpdateOutcome>,
    pub corrections: Vec<HandleCorrection>,
    pub contamination: Vec<ContaminationWarning>,
    pub report: MismatchReport,
}

/// Stable digest over every row's identity, status and grade.
pub fn snapshot_digest(snapshot: &[TargetRecord]) -> String {
    let mut hasher = Sha256::new();
    for row in snapshot {
        for component in [
            row.id.as_str(),
            row.name.as_str(),
            row.current_status.as_str(),
            row.current_grade.as_deref().unwrap_or(""),
        ] {
            hasher.update(component.as_bytes());
            hasher.update([0]);
        }
        hasher.update([1]);
    }
    format!("snap1_{:x}", hasher.finalize())
}

/// Reconcile `sources` against the session's target and apply the plan.
///
/// `roster_has_status` says whether the roster carried a status column; the
/// configured [`crate::StatusColumnMode`] decides whether status is written.
pub fn run_batch<S: TargetSurface + ?Sized>(
    session: &mut Session<'_, S>,
    sources: &[SourceRecord],
    roster_has_status: bool,
) -> Result<RunOutcome, EngineError> {
    let started_at = Utc::now();
    let roster_id = session
        .config()
        .roster_id
        .clone()
        .unwrap_or_else(|| DEFAULT_ROSTER_ID.to_string());
    let include_status = session.config().status_column.resolve(roster_has_status);

    if session.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let initial = session.surface().collect()?;
    if initial.is_empty() {
        tracing::error!("target surface returned no records");
        return Err(EngineError::NoTargetData);
    }
    tracing::info!(
        roster_id = %roster_id,
        sources = sources.len(),
        targets = initial.len(),
        include_status,
        "collected target snapshot"
    );

    let total_marks_applied = apply_total_marks(session);

    let matched = match_records(sources, &initial);
    let validation_snapshot = session.surface().collect()?;
    let validated = revalidate(matched.matches, &validation_snapshot);

    let mut unmatched_source = matched.unmatched_source;
    unmatched_source.extend(validated.dropped);
    let plan: Vec<UpdatePlanEntry> = validated
        .matches
        .iter()
        .map(|matched| UpdatePlanEntry::from_match(matched, include_status))
        .collect();

    let report = MismatchReport::new(roster_id.clone(), started_at)
        .with_unmatched_source(&unmatched_source)
        .with_unmatched_target(&matched.unmatched_target);

    if plan.is_empty() {
        tracing::error!(
            unmatched_source = unmatched_source.len(),
            "no update plan entries; nothing to write"
        );
        return Err(EngineError::EmptyPlan {
            report: Box::new(report),
        });
    }
    if session.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    // The validation snapshot doubles as the pre-mutation population.
    let snapshot_before = snapshot_digest(&validation_snapshot);
    let outcomes = execute_plan(session, &plan);

    let post = session.surface().collect()?;
    let snapshot_after = snapshot_digest(&post);
    let planned: BTreeSet<PositionalHandle> =
        plan.iter().map(|entry| entry.positional_handle).collect();
    let contamination = detect_contamination(&validation_snapshot, &post, &planned);

    let report = report.with_outcomes(&outcomes).with_contamination(&contamination);
    let updated = outcomes.iter().filter(|outcome| outcome.is_success()).count();
    let summary = RunSummary {
        roster_id,
        started_at,
        finished_at: Utc::now(),
        source_count: sources.len(),
        target_count: initial.len(),
        matched: plan.len(),
        updated,
        failed: plan.len() - updated,
        grades_verified: outcomes.iter().filter(|o| o.grade_verified).count(),
        statuses_verified: outcomes.iter().filter(|o| o.status_verified).count(),
        unmatched_source: unmatched_source.len(),
        unmatched_target: matched.unmatched_target.len(),
        corrections: validated.corrections.len(),
        guard_failures: outcomes.iter().filter(|o| o.is_guard_failure()).count(),
        contamination_warnings: contamination.len(),
        status_written: include_status,
        total_marks_applied,
        snapshot_before,
        snapshot_after,
    };
    tracing::info!(
        matched = summary.matched,
        updated = summary.updated,
        failed = summary.failed,
        grades = summary.grades_verified,
        statuses = summary.statuses_verified,
        unmatched_source = summary.unmatched_source,
        unmatched_target = summary.unmatched_target,
        contamination = summary.contamination_warnings,
        "run complete"
    );

    Ok(RunOutcome {
        summary,
        plan,
        outcomes,
        corrections: validated.corrections,
        contamination,
        report,
    })
}

fn apply_total_marks<S: TargetSurface + ?Sized>(session: &mut Session<'_, S>) -> Option<bool> {
    let total = session.config().total_marks.clone()?;
    match session.surface().set_total_marks(&total) {
        Ok(true) => {
            tracing::info!(total_marks = %total, "total marks set");
            session.settle_after_write();
            Some(true)
        }
        Ok(false) => {
            tracing::warn!(total_marks = %total, "target has no total-marks field; continuing");
            Some(false)
        }
        Err(err) => {
            tracing::warn!(total_marks = %total, "failed to set total marks, continuing: {err}");
            Some(false)
        }
    }
}

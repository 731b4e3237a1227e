//! Guarded, verified mutation of the target, one plan entry at a time.
//!
//! Every write is preceded by an identity guard at the entry's handle, and
//! every write is read back. Failures are recorded in the entry's
//! [`UpdateOutcome`]; the batch always continues.

use crate::error::{RecordFailure, SurfaceError};
use crate::record::{PositionalHandle, UpdatePlanEntry, split_composite};
use crate::session::Session;
use crate::status::{Status, select_status_option};
use crate::surface::TargetSurface;
use serde::{Deserialize, Serialize};

/// What happened to an entry's status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusAction {
    /// No status column, or the entry stopped before the status step.
    #[default]
    NotRequested,
    /// The target already showed the wanted status; nothing was written.
    AlreadyCorrect,
    Written,
    /// The first select did not stick and the cycle ran a second time.
    Retried,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub target_id: String,
    pub source_id: String,
    pub positional_handle: PositionalHandle,
    pub grade_write_succeeded: bool,
    pub grade_verified: bool,
    pub status_write_succeeded: bool,
    pub status_verified: bool,
    pub status_action: StatusAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordFailure>,
}

impl UpdateOutcome {
    fn pending(entry: &UpdatePlanEntry) -> Self {
        Self {
            target_id: entry.target_id.clone(),
            source_id: entry.source_id.clone(),
            positional_handle: entry.positional_handle,
            grade_write_succeeded: false,
            grade_verified: false,
            status_write_succeeded: false,
            status_verified: false,
            status_action: StatusAction::NotRequested,
            matched_option: None,
            error: None,
        }
    }

    fn cancelled(entry: &UpdatePlanEntry) -> Self {
        Self {
            error: Some(RecordFailure::Cancelled),
            ..Self::pending(entry)
        }
    }

    /// Grade verified and, when requested, status verified.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self.grade_verified
            && (self.status_action == StatusAction::NotRequested || self.status_verified)
    }

    pub fn is_guard_failure(&self) -> bool {
        matches!(self.error, Some(RecordFailure::GuardFailure { .. }))
    }

    // Keep the first failure; later steps still run.
    fn record_failure(&mut self, failure: RecordFailure) {
        if self.error.is_none() {
            self.error = Some(failure);
        }
    }
}

/// Apply every entry in order. Cancellation is checked between entries;
/// entries not reached are recorded as cancelled.
pub fn execute_plan<S: TargetSurface + ?Sized>(
    session: &mut Session<'_, S>,
    plan: &[UpdatePlanEntry],
) -> Vec<UpdateOutcome> {
    let mut outcomes = Vec::with_capacity(plan.len());
    for (idx, entry) in plan.iter().enumerate() {
        if session.is_cancelled() {
            tracing::warn!(
                remaining = plan.len() - idx,
                "run cancelled; remaining entries not processed"
            );
            outcomes.extend(plan[idx..].iter().map(UpdateOutcome::cancelled));
            break;
        }
        if idx > 0 {
            session.settle_between_records();
        }
        outcomes.push(execute_entry(session, entry));
    }
    outcomes
}

/// Guard, write, settle and verify one entry.
pub fn execute_entry<S: TargetSurface + ?Sized>(
    session: &mut Session<'_, S>,
    entry: &UpdatePlanEntry,
) -> UpdateOutcome {
    let mut outcome = UpdateOutcome::pending(entry);

    if let Err(failure) = guard(session, entry) {
        outcome.record_failure(failure);
        return outcome;
    }

    let rendered = entry.grade.to_string();
    match write_and_verify_grade(session, entry.positional_handle, &rendered) {
        Ok(read_back) => {
            outcome.grade_write_succeeded = true;
            if entry.grade.matches_rendered(&read_back) {
                outcome.grade_verified = true;
                tracing::debug!(target_id = %entry.target_id, grade = %rendered, "grade verified");
            } else {
                tracing::error!(
                    target_id = %entry.target_id,
                    written = %rendered,
                    read_back = %read_back,
                    "grade verification failed"
                );
                outcome.record_failure(RecordFailure::GradeVerification {
                    written: rendered.clone(),
                    read_back,
                });
            }
        }
        Err(err) => {
            tracing::error!(target_id = %entry.target_id, "grade write failed: {err}");
            outcome.record_failure(err.into());
        }
    }

    if let Some(status) = entry.status {
        apply_status(session, entry, status, &mut outcome);
    }

    outcome
}

/// Confirm the identity rendered at the entry's handle is still its target.
fn guard<S: TargetSurface + ?Sized>(
    session: &mut Session<'_, S>,
    entry: &UpdatePlanEntry,
) -> Result<(), RecordFailure> {
    let found = session.surface().read_identity(entry.positional_handle)?;
    let live_id = found.as_deref().map(|rendered| split_composite(rendered).0);
    if live_id.as_deref() == Some(entry.target_id.as_str()) {
        return Ok(());
    }
    tracing::error!(
        target_id = %entry.target_id,
        handle = entry.positional_handle.index(),
        found = ?found,
        "identity guard failed; skipping write"
    );
    Err(RecordFailure::GuardFailure {
        handle: entry.positional_handle,
        expected: entry.target_id.clone(),
        found,
    })
}

fn write_and_verify_grade<S: TargetSurface + ?Sized>(
    session: &mut Session<'_, S>,
    handle: PositionalHandle,
    rendered: &str,
) -> Result<String, SurfaceError> {
    session.surface().write_grade(handle, rendered)?;
    session.settle_after_write();
    session.surface().read_grade(handle)
}

fn apply_status<S: TargetSurface + ?Sized>(
    session: &mut Session<'_, S>,
    entry: &UpdatePlanEntry,
    status: Status,
    outcome: &mut UpdateOutcome,
) {
    if let Err(failure) = guard(session, entry) {
        outcome.record_failure(failure);
        return;
    }

    let handle = entry.positional_handle;
    match session.surface().read_status(handle) {
        Ok(shown) if status.is_shown_by(&shown) => {
            outcome.status_action = StatusAction::AlreadyCorrect;
            outcome.status_verified = true;
            return;
        }
        Ok(_) => {}
        Err(err) => {
            outcome.record_failure(err.into());
            return;
        }
    }

    for attempt in 1..=2u32 {
        let selected = match select_once(session, handle, status) {
            Ok(selected) => selected,
            Err(failure) => {
                tracing::error!(target_id = %entry.target_id, attempt, "status write failed: {failure}");
                outcome.record_failure(failure);
                return;
            }
        };
        outcome.status_write_succeeded = true;
        outcome.matched_option = Some(selected.clone());
        outcome.status_action = if attempt == 1 {
            StatusAction::Written
        } else {
            StatusAction::Retried
        };

        let shown = match session.surface().read_status(handle) {
            Ok(shown) => shown,
            Err(err) => {
                outcome.record_failure(err.into());
                return;
            }
        };
        if shown.trim() == selected || status.is_shown_by(&shown) {
            outcome.status_verified = true;
            return;
        }

        if attempt == 1 {
            tracing::warn!(
                target_id = %entry.target_id,
                expected = status.label(),
                shown = %shown,
                "status did not stick; retrying once"
            );
        } else {
            tracing::error!(
                target_id = %entry.target_id,
                expected = status.label(),
                shown = %shown,
                "status verification failed"
            );
            outcome.record_failure(RecordFailure::StatusVerification {
                expected: status.label().to_string(),
                shown,
            });
        }
    }
}

/// One open/select/close cycle. Returns the option text selected.
fn select_once<S: TargetSurface + ?Sized>(
    session: &mut Session<'_, S>,
    handle: PositionalHandle,
    status: Status,
) -> Result<String, RecordFailure> {
    let options = session.surface().open_status_control(handle)?;
    let Some(choice) = select_status_option(&options, status) else {
        session.surface().close_status_control()?;
        return Err(RecordFailure::NoStatusOption {
            target: status.label().to_string(),
            available: options,
        });
    };
    tracing::debug!(option = %choice.option, method = ?choice.method, "status option chosen");

    let selected = session.surface().select_status_option(&choice.option);
    session.surface().close_status_control()?;
    selected?;
    session.settle_after_dropdown();
    Ok(choice.option)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, SettleConfig};
    use crate::grade::Grade;
    use crate::record::TargetRecord;
    use crate::surface::{SnapshotCollector, TargetMutator};

    /// In-memory rows; `sticky_after` makes status selects fail to stick for
    /// the first N attempts.
    #[derive(Default)]
    struct Rows {
        identities: Vec<String>,
        grades: Vec<String>,
        statuses: Vec<String>,
        options: Vec<String>,
        open: Option<usize>,
        ignore_selects: usize,
        selects: usize,
        grade_writes: usize,
        mangle_grade: bool,
    }

    impl Rows {
        fn new(ids: &[&str]) -> Self {
            Self {
                identities: ids.iter().map(|id| format!("{id}-Name")).collect(),
                grades: vec![String::new(); ids.len()],
                statuses: vec!["Present".to_string(); ids.len()],
                options: vec!["Present".into(), "Absent".into(), "On-Hold".into()],
                ..Self::default()
            }
        }
    }

    impl SnapshotCollector for Rows {
        fn collect(&mut self) -> Result<Vec<TargetRecord>, SurfaceError> {
            Ok(self
                .identities
                .iter()
                .enumerate()
                .map(|(idx, identity)| {
                    TargetRecord::from_composite(PositionalHandle(idx), identity, &self.statuses[idx])
                })
                .collect())
        }
    }

    impl TargetMutator for Rows {
        fn read_identity(&mut self, handle: PositionalHandle) -> Result<Option<String>, SurfaceError> {
            Ok(self.identities.get(handle.index()).cloned())
        }

        fn write_grade(&mut self, handle: PositionalHandle, value: &str) -> Result<(), SurfaceError> {
            self.grade_writes += 1;
            let slot = self
                .grades
                .get_mut(handle.index())
                .ok_or(SurfaceError::NoSuchRow(handle))?;
            *slot = if self.mangle_grade {
                format!("{value}9")
            } else {
                value.to_string()
            };
            Ok(())
        }

        fn read_grade(&mut self, handle: PositionalHandle) -> Result<String, SurfaceError> {
            self.grades
                .get(handle.index())
                .cloned()
                .ok_or(SurfaceError::NoSuchRow(handle))
        }

        fn open_status_control(&mut self, handle: PositionalHandle) -> Result<Vec<String>, SurfaceError> {
            self.open = Some(handle.index());
            Ok(self.options.clone())
        }

        fn select_status_option(&mut self, option: &str) -> Result<(), SurfaceError> {
            let idx = self.open.ok_or(SurfaceError::NoOpenControl)?;
            self.selects += 1;
            if self.selects > self.ignore_selects {
                self.statuses[idx] = option.to_string();
            }
            Ok(())
        }

        fn close_status_control(&mut self) -> Result<(), SurfaceError> {
            self.open = None;
            Ok(())
        }

        fn read_status(&mut self, handle: PositionalHandle) -> Result<String, SurfaceError> {
            self.statuses
                .get(handle.index())
                .cloned()
                .ok_or(SurfaceError::NoSuchRow(handle))
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            settle: SettleConfig::none(),
            ..EngineConfig::default()
        }
    }

    fn entry(id: &str, handle: usize, hundredths: i64, status: Option<Status>) -> UpdatePlanEntry {
        UpdatePlanEntry {
            target_id: id.to_string(),
            positional_handle: PositionalHandle(handle),
            grade: Grade::from_hundredths(hundredths),
            status,
            source_id: id.to_string(),
            source_serial: "1".to_string(),
        }
    }

    #[test]
    fn writes_and_verifies_grade_and_status() {
        let mut rows = Rows::new(&["1", "2"]);
        let outcome = {
            let mut session = Session::new(&mut rows, config());
            execute_entry(&mut session, &entry("2", 1, 8050, Some(Status::Absent)))
        };
        assert!(outcome.is_success(), "{outcome:?}");
        assert_eq!(outcome.status_action, StatusAction::Written);
        assert_eq!(outcome.matched_option.as_deref(), Some("Absent"));
        assert_eq!(rows.grades[1], "80.50");
        assert_eq!(rows.statuses[1], "Absent");
        assert_eq!(rows.statuses[0], "Present");
    }

    #[test]
    fn guard_failure_skips_every_write() {
        let mut rows = Rows::new(&["1", "2"]);
        let outcome = {
            let mut session = Session::new(&mut rows, config());
            execute_entry(&mut session, &entry("2", 0, 100, Some(Status::Absent)))
        };
        assert!(outcome.is_guard_failure());
        assert!(!outcome.grade_write_succeeded);
        assert_eq!(rows.grade_writes, 0);
        assert_eq!(rows.selects, 0);
        assert_eq!(
            outcome.error,
            Some(RecordFailure::GuardFailure {
                handle: PositionalHandle(0),
                expected: "2".to_string(),
                found: Some("1-Name".to_string()),
            })
        );
    }

    #[test]
    fn status_already_correct_is_not_rewritten() {
        let mut rows = Rows::new(&["1"]);
        let outcome = {
            let mut session = Session::new(&mut rows, config());
            execute_entry(&mut session, &entry("1", 0, 0, Some(Status::Present)))
        };
        assert!(outcome.is_success());
        assert_eq!(outcome.status_action, StatusAction::AlreadyCorrect);
        assert_eq!(rows.selects, 0);
    }

    #[test]
    fn status_is_retried_exactly_once() {
        let mut rows = Rows::new(&["1"]);
        rows.ignore_selects = 1;
        let outcome = {
            let mut session = Session::new(&mut rows, config());
            execute_entry(&mut session, &entry("1", 0, 0, Some(Status::OnHold)))
        };
        assert!(outcome.is_success());
        assert_eq!(outcome.status_action, StatusAction::Retried);
        assert_eq!(rows.selects, 2);

        let mut rows = Rows::new(&["1"]);
        rows.ignore_selects = 5;
        let outcome = {
            let mut session = Session::new(&mut rows, config());
            execute_entry(&mut session, &entry("1", 0, 0, Some(Status::OnHold)))
        };
        assert!(!outcome.status_verified);
        assert_eq!(rows.selects, 2);
        assert!(matches!(
            outcome.error,
            Some(RecordFailure::StatusVerification { .. })
        ));
    }

    #[test]
    fn keyword_only_option_verifies_and_is_not_rewritten() {
        let mut rows = Rows::new(&["1"]);
        rows.options = vec!["Present".into(), "Absent".into(), "Hold".into()];
        let outcome = {
            let mut session = Session::new(&mut rows, config());
            execute_entry(&mut session, &entry("1", 0, 0, Some(Status::OnHold)))
        };
        assert!(outcome.is_success(), "{outcome:?}");
        assert_eq!(outcome.status_action, StatusAction::Written);
        assert_eq!(outcome.matched_option.as_deref(), Some("Hold"));
        assert_eq!(rows.statuses[0], "Hold");
        assert_eq!(rows.selects, 1);

        let outcome = {
            let mut session = Session::new(&mut rows, config());
            execute_entry(&mut session, &entry("1", 0, 0, Some(Status::OnHold)))
        };
        assert!(outcome.is_success(), "{outcome:?}");
        assert_eq!(outcome.status_action, StatusAction::AlreadyCorrect);
        assert_eq!(rows.selects, 1);
    }

    #[test]
    fn grade_mismatch_still_attempts_status() {
        let mut rows = Rows::new(&["1"]);
        rows.mangle_grade = true;
        let outcome = {
            let mut session = Session::new(&mut rows, config());
            execute_entry(&mut session, &entry("1", 0, 4200, Some(Status::Absent)))
        };
        assert!(outcome.grade_write_succeeded);
        assert!(!outcome.grade_verified);
        assert!(outcome.status_verified);
        assert!(matches!(
            outcome.error,
            Some(RecordFailure::GradeVerification { .. })
        ));
    }

    #[test]
    fn missing_option_is_reported() {
        let mut rows = Rows::new(&["1"]);
        rows.options = vec!["Attending".into(), "Missing".into()];
        let outcome = {
            let mut session = Session::new(&mut rows, config());
            execute_entry(&mut session, &entry("1", 0, 0, Some(Status::OnHold)))
        };
        assert!(!outcome.status_write_succeeded);
        assert!(rows.open.is_none());
        assert!(matches!(
            outcome.error,
            Some(RecordFailure::NoStatusOption { .. })
        ));
    }

    #[test]
    fn cancellation_stops_between_records() {
        let mut rows = Rows::new(&["1", "2"]);
        let plan = vec![entry("1", 0, 100, None), entry("2", 1, 200, None)];
        let mut session = Session::new(&mut rows, config());
        session.cancel_token().cancel();
        let outcomes = execute_plan(&mut session, &plan);
        assert_eq!(outcomes.len(), 2);
        assert!(
            outcomes
                .iter()
                .all(|o| o.error == Some(RecordFailure::Cancelled))
        );
    }
}

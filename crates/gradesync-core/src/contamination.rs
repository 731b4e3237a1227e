//! Population-wide before/after diff for unplanned changes.

use crate::record::{PositionalHandle, TargetRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    StatusChanged,
    GradeChanged,
    /// Present before the batch, absent after.
    Vanished,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChanged => "status-changed",
            Self::GradeChanged => "grade-changed",
            Self::Vanished => "vanished",
        }
    }
}

/// A record outside the plan that changed while the batch ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContaminationWarning {
    pub target_id: String,
    pub name: String,
    pub kind: ChangeKind,
    pub before: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    pub handle_before: PositionalHandle,
}

// Rows sharing an id are told apart by their order of appearance.
type RowKey<'a> = (&'a str, usize);

fn keyed(snapshot: &[TargetRecord]) -> BTreeMap<RowKey<'_>, &TargetRecord> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    snapshot
        .iter()
        .map(|row| {
            let occurrence = seen.entry(row.id.as_str()).or_default();
            let key = (row.id.as_str(), *occurrence);
            *occurrence += 1;
            (key, row)
        })
        .collect()
}

/// Compare every row of `pre` outside the plan against `post`.
///
/// `planned` holds the handles the plan wrote to, taken from the same
/// snapshot as `pre`. A row sharing an id with a planned row is still
/// checked.
pub fn detect_contamination(
    pre: &[TargetRecord],
    post: &[TargetRecord],
    planned: &BTreeSet<PositionalHandle>,
) -> Vec<ContaminationWarning> {
    let after = keyed(post);
    let mut warnings = Vec::new();

    for (key, before) in keyed(pre) {
        if planned.contains(&before.positional_handle) {
            continue;
        }
        let warning = |kind, before_value: &str, after_value: Option<&str>| ContaminationWarning {
            target_id: before.id.clone(),
            name: before.name.clone(),
            kind,
            before: before_value.to_string(),
            after: after_value.map(str::to_string),
            handle_before: before.positional_handle,
        };

        let Some(now) = after.get(&key) else {
            warnings.push(warning(ChangeKind::Vanished, before.composite().as_str(), None));
            continue;
        };
        if before.current_status != now.current_status {
            warnings.push(warning(
                ChangeKind::StatusChanged,
                before.current_status.as_str(),
                Some(now.current_status.as_str()),
            ));
        }
        if let (Some(was), Some(is)) = (&before.current_grade, &now.current_grade)
            && was.trim() != is.trim()
        {
            warnings.push(warning(ChangeKind::GradeChanged, was.as_str(), Some(is.as_str())));
        }
    }

    for warning in &warnings {
        tracing::warn!(
            target_id = %warning.target_id,
            name = %warning.name,
            kind = warning.kind.as_str(),
            before = %warning.before,
            after = ?warning.after,
            "cross-contamination: record outside the plan changed"
        );
    }
    warnings
}

//! Positional handle revalidation against a fresh snapshot.
//!
//! A handle captured at match time may be stale by the time a mutation is
//! issued: rows get re-rendered, filtered or reordered. Each match is looked
//! up again by its target identity; a moved row gets a corrected handle and
//! a vanished row demotes the match to an unmatched source record.

use crate::record::{
    MatchResult, PositionalHandle, SourceUnmatchedReason, TargetRecord, UnmatchedSourceRecord,
};
use serde::{Deserialize, Serialize};

/// Notice that a matched identity moved between snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleCorrection {
    pub source_id: String,
    pub target_id: String,
    pub from: PositionalHandle,
    pub to: PositionalHandle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    /// Matches whose handles now point at their identity in the fresh snapshot.
    pub matches: Vec<MatchResult>,
    pub corrections: Vec<HandleCorrection>,
    pub dropped: Vec<UnmatchedSourceRecord>,
}

/// Recompute every match's handle against `fresh`.
///
/// A fresh row is assigned to at most one match. Identities still sitting
/// at their recorded handle keep that row; the rest take the first
/// unassigned row with their identity in snapshot order.
pub fn revalidate(matches: Vec<MatchResult>, fresh: &[TargetRecord]) -> ValidationOutcome {
    let mut assigned = vec![false; fresh.len()];

    let mut positions: Vec<Option<usize>> = matches
        .iter()
        .map(|matched| {
            let idx = fresh.iter().position(|row| {
                row.positional_handle == matched.positional_handle && row.id == matched.target.id
            })?;
            if assigned[idx] {
                return None;
            }
            assigned[idx] = true;
            Some(idx)
        })
        .collect();
    for (matched, position) in matches.iter().zip(positions.iter_mut()) {
        if position.is_some() {
            continue;
        }
        *position = fresh
            .iter()
            .enumerate()
            .find(|(idx, row)| !assigned[*idx] && row.id == matched.target.id)
            .map(|(idx, _)| idx);
        if let Some(idx) = *position {
            assigned[idx] = true;
        }
    }

    let mut outcome = ValidationOutcome::default();
    for (mut matched, position) in matches.into_iter().zip(positions) {
        let expected_id = matched.target.id.as_str();
        let Some(idx) = position else {
            tracing::error!(
                source_id = matched.source.id(),
                target_id = expected_id,
                handle = matched.positional_handle.index(),
                "matched identity no longer rendered; dropping"
            );
            outcome.dropped.push(UnmatchedSourceRecord {
                record: matched.source,
                reason: SourceUnmatchedReason::StaleHandle,
            });
            continue;
        };

        let row = &fresh[idx];
        if row.positional_handle != matched.positional_handle {
            tracing::warn!(
                source_id = matched.source.id(),
                target_id = expected_id,
                from = matched.positional_handle.index(),
                to = row.positional_handle.index(),
                "positional handle corrected"
            );
            outcome.corrections.push(HandleCorrection {
                source_id: matched.source.id().to_string(),
                target_id: row.id.clone(),
                from: matched.positional_handle,
                to: row.positional_handle,
            });
        }
        matched.positional_handle = row.positional_handle;
        matched.target = row.clone();
        outcome.matches.push(matched);
    }

    tracing::info!(
        validated = outcome.matches.len(),
        corrected = outcome.corrections.len(),
        dropped = outcome.dropped.len(),
        "handle revalidation complete"
    );
    outcome
}

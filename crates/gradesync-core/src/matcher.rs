//! Identity matching between source rows and one target snapshot.
//!
//! Strategies are tried in fixed precedence per source row; within a
//! strategy the first unclaimed target in snapshot order wins. A claimed
//! target is never re-matched (first-match ownership). Pure: absence of a
//! match is an outcome, not an error.

use crate::record::{
    MatchResult, SourceRecord, SourceUnmatchedReason, TargetRecord, TargetUnmatchedReason,
    UnmatchedSourceRecord, UnmatchedTargetRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A named identity-matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    /// Exact id equality.
    DirectId,
    /// Exact `"{id}-{name}"` equality, for targets exposing a merged field.
    CompositeIdName,
    /// Case-folded `"{id}-{name}"` equality.
    CaseInsensitiveComposite,
    /// Case-folded id equality. Last resort.
    IdOnlyFallback,
}

impl MatchStrategy {
    /// Precedence order.
    pub const ORDERED: [MatchStrategy; 4] = [
        MatchStrategy::DirectId,
        MatchStrategy::CompositeIdName,
        MatchStrategy::CaseInsensitiveComposite,
        MatchStrategy::IdOnlyFallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectId => "direct-id",
            Self::CompositeIdName => "composite-id-name",
            Self::CaseInsensitiveComposite => "case-insensitive-composite",
            Self::IdOnlyFallback => "id-only-fallback",
        }
    }

    /// Whether this strategy pairs `source` with `target`.
    pub fn accepts(&self, source: &SourceRecord, target: &TargetRecord) -> bool {
        self.accepts_keys(&IdentityKeys::of_source(source), &IdentityKeys::of_target(target))
    }

    fn accepts_keys(&self, source: &IdentityKeys, target: &IdentityKeys) -> bool {
        if source.id.is_empty() || target.id.is_empty() {
            return false;
        }
        match self {
            Self::DirectId => source.id == target.id,
            Self::CompositeIdName => source.composite == target.composite,
            Self::CaseInsensitiveComposite => source.composite_folded == target.composite_folded,
            Self::IdOnlyFallback => source.id_folded == target.id_folded,
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct IdentityKeys {
    id: String,
    composite: String,
    id_folded: String,
    composite_folded: String,
}

impl IdentityKeys {
    fn build(id: &str, composite: String) -> Self {
        Self {
            id: id.to_string(),
            id_folded: id.to_lowercase(),
            composite_folded: composite.to_lowercase(),
            composite,
        }
    }

    fn of_source(record: &SourceRecord) -> Self {
        Self::build(record.id(), record.composite())
    }

    fn of_target(record: &TargetRecord) -> Self {
        Self::build(&record.id, record.composite())
    }
}

/// Matcher output: every source row appears exactly once across
/// `matches` and `unmatched_source`; every target row exactly once across
/// `matches` and `unmatched_target`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub matches: Vec<MatchResult>,
    pub unmatched_source: Vec<UnmatchedSourceRecord>,
    pub unmatched_target: Vec<UnmatchedTargetRecord>,
}

/// Pair source rows with rows of one target snapshot.
pub fn match_records(sources: &[SourceRecord], snapshot: &[TargetRecord]) -> MatchOutcome {
    let target_keys: Vec<IdentityKeys> = snapshot.iter().map(IdentityKeys::of_target).collect();
    let mut claimed = vec![false; snapshot.len()];
    let mut outcome = MatchOutcome::default();

    for source in sources {
        let source_keys = IdentityKeys::of_source(source);
        let mut saw_claimed = false;
        let mut found = None;

        'strategies: for strategy in MatchStrategy::ORDERED {
            for (idx, keys) in target_keys.iter().enumerate() {
                if !strategy.accepts_keys(&source_keys, keys) {
                    continue;
                }
                if claimed[idx] {
                    saw_claimed = true;
                    continue;
                }
                found = Some((idx, strategy));
                break 'strategies;
            }
        }

        match found {
            Some((idx, method)) => {
                claimed[idx] = true;
                let target = snapshot[idx].clone();
                tracing::debug!(
                    source_id = source.id(),
                    target_id = %target.id,
                    handle = target.positional_handle.index(),
                    %method,
                    "matched"
                );
                outcome.matches.push(MatchResult {
                    source: source.clone(),
                    positional_handle: target.positional_handle,
                    target,
                    method,
                });
            }
            None => {
                let reason = if saw_claimed {
                    SourceUnmatchedReason::CandidateClaimed
                } else {
                    SourceUnmatchedReason::NoCandidate
                };
                tracing::warn!(
                    serial = source.serial(),
                    source_id = source.id(),
                    name = source.name(),
                    reason = reason.as_str(),
                    "no target match"
                );
                outcome.unmatched_source.push(UnmatchedSourceRecord {
                    record: source.clone(),
                    reason,
                });
            }
        }
    }

    let claimed_ids: BTreeSet<&str> = snapshot
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| **claimed)
        .map(|(target, _)| target.id.as_str())
        .collect();
    for (target, _) in snapshot.iter().zip(&claimed).filter(|(_, claimed)| !**claimed) {
        let reason = if claimed_ids.contains(target.id.as_str()) {
            TargetUnmatchedReason::DuplicateIdentity
        } else {
            TargetUnmatchedReason::NotInSource
        };
        tracing::warn!(
            target_id = %target.id,
            name = %target.name,
            reason = reason.as_str(),
            "target row not in source"
        );
        outcome.unmatched_target.push(UnmatchedTargetRecord {
            record: target.clone(),
            reason,
        });
    }

    tracing::info!(
        matched = outcome.matches.len(),
        unmatched_source = outcome.unmatched_source.len(),
        unmatched_target = outcome.unmatched_target.len(),
        "identity matching complete"
    );
    outcome
}

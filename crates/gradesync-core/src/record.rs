//! Source and target records, match results, and update plan entries.

use crate::grade::Grade;
use crate::matcher::MatchStrategy;
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name given to a target row whose rendered identity has no name part.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Index into one target snapshot. Valid only for that snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionalHandle(pub usize);

impl PositionalHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for PositionalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Validation errors raised while constructing records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record id is empty")]
    EmptyId,
}

/// One roster row from the source. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    serial: String,
    id: String,
    name: String,
    grade: Grade,
    status: Status,
}

impl SourceRecord {
    /// Build a source record. `id`, `serial` and `name` are trimmed; an
    /// empty id is rejected.
    pub fn new(
        serial: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        grade: Grade,
        status: Status,
    ) -> Result<Self, RecordError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(RecordError::EmptyId);
        }
        Ok(Self {
            serial: serial.into().trim().to_string(),
            id,
            name: name.into().trim().to_string(),
            grade,
            status,
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grade(&self) -> Grade {
        self.grade
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// `"{id}-{name}"`, the merged identity some targets expose.
    pub fn composite(&self) -> String {
        format!("{}-{}", self.id, self.name)
    }
}

/// One row of a target snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub id: String,
    pub name: String,
    pub positional_handle: PositionalHandle,
    pub current_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_grade: Option<String>,
}

impl TargetRecord {
    pub fn new(
        handle: PositionalHandle,
        id: impl Into<String>,
        name: impl Into<String>,
        current_status: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into().trim().to_string(),
            name: name.into().trim().to_string(),
            positional_handle: handle,
            current_status: current_status.into().trim().to_string(),
            current_grade: None,
        }
    }

    /// Parse a rendered `"{id}-{name}"` field. The split is on the first
    /// hyphen so names may contain hyphens; a value without one is all id.
    pub fn from_composite(
        handle: PositionalHandle,
        rendered: &str,
        current_status: impl Into<String>,
    ) -> Self {
        let (id, name) = split_composite(rendered);
        Self::new(handle, id, name, current_status)
    }

    pub fn with_grade(mut self, grade: impl Into<String>) -> Self {
        self.current_grade = Some(grade.into());
        self
    }

    pub fn composite(&self) -> String {
        format!("{}-{}", self.id, self.name)
    }
}

/// Split a rendered composite identity into `(id, name)`.
pub fn split_composite(rendered: &str) -> (String, String) {
    match rendered.split_once('-') {
        Some((id, name)) => (id.trim().to_string(), name.trim().to_string()),
        None => (rendered.trim().to_string(), UNKNOWN_NAME.to_string()),
    }
}

/// A source row paired with the target row it was matched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub source: SourceRecord,
    pub target: TargetRecord,
    pub method: MatchStrategy,
    pub positional_handle: PositionalHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceUnmatchedReason {
    /// No strategy found any target row.
    NoCandidate,
    /// A strategy found a target row, but an earlier source row owns it.
    CandidateClaimed,
    /// Matched, but the target identity vanished before mutation.
    StaleHandle,
}

impl SourceUnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCandidate => "no-candidate",
            Self::CandidateClaimed => "candidate-claimed",
            Self::StaleHandle => "stale-handle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetUnmatchedReason {
    NotInSource,
    /// Another row with the same id was claimed.
    DuplicateIdentity,
}

impl TargetUnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInSource => "not-in-source",
            Self::DuplicateIdentity => "duplicate-identity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedSourceRecord {
    pub record: SourceRecord,
    pub reason: SourceUnmatchedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedTargetRecord {
    pub record: TargetRecord,
    pub reason: TargetUnmatchedReason,
}

/// Unit of work handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanEntry {
    pub target_id: String,
    pub positional_handle: PositionalHandle,
    pub grade: Grade,
    /// `None` when the roster carries no status column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    pub source_id: String,
    pub source_serial: String,
}

impl UpdatePlanEntry {
    pub fn from_match(matched: &MatchResult, include_status: bool) -> Self {
        Self {
            target_id: matched.target.id.clone(),
            positional_handle: matched.positional_handle,
            grade: matched.source.grade(),
            status: include_status.then(|| matched.source.status()),
            source_id: matched.source.id().to_string(),
            source_serial: matched.source.serial().to_string(),
        }
    }
}

//! Error types for engine runs and per-record failures.

use crate::record::PositionalHandle;
use crate::report::MismatchReport;
use serde::{Deserialize, Serialize};

/// A collaborator could not complete a read or write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("no rendered row at {0}")]
    NoSuchRow(PositionalHandle),

    #[error("no status control is open")]
    NoOpenControl,

    #[error("status option not offered: {0:?}")]
    NoSuchOption(String),

    #[error("target surface unavailable: {0}")]
    Unavailable(String),
}

/// Errors that stop a run before any record is processed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The first snapshot returned no rows.
    #[error("target surface returned no records")]
    NoTargetData,

    /// Nothing survived matching and revalidation. The report still lists
    /// everything that could not be reconciled.
    #[error("no update plan entries to act on ({} unmatched source record(s))", .report.in_source_not_target.len())]
    EmptyPlan { report: Box<MismatchReport> },

    #[error("run cancelled before mutation began")]
    Cancelled,

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Why one plan entry could not be fully applied. Recorded in the entry's
/// outcome; never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RecordFailure {
    #[error("guard failed at {handle}: expected {expected:?}, found {found:?}")]
    GuardFailure {
        handle: PositionalHandle,
        expected: String,
        found: Option<String>,
    },

    #[error("grade verification failed: wrote {written:?}, read back {read_back:?}")]
    GradeVerification { written: String, read_back: String },

    #[error("status verification failed: expected {expected:?}, shows {shown:?}")]
    StatusVerification { expected: String, shown: String },

    #[error("no status option matches {target:?} (available: {available:?})")]
    NoStatusOption {
        target: String,
        available: Vec<String>,
    },

    #[error("surface error: {message}")]
    Surface { message: String },

    #[error("run cancelled before this record")]
    Cancelled,
}

impl From<SurfaceError> for RecordFailure {
    fn from(err: SurfaceError) -> Self {
        Self::Surface {
            message: err.to_string(),
        }
    }
}

//! # gradesync-core
//!
//! Reconciles a source roster against a rendered target surface and applies
//! grade/status updates with guarded writes and read-back verification.
//!
//! Position is ephemeral and identity is the only trustworthy key: every
//! positional handle is revalidated against a fresh snapshot before the
//! batch, and the identity at that handle is re-read before each write.
//!
//! ## Pipeline
//!
//! ```text
//! [SourceRecord]  +  collect() -> [TargetRecord]
//!     │
//! matcher::match_records          ← tiered strategies, first-match ownership
//!     │
//! validator::revalidate           ← fresh snapshot, handle correction / demotion
//!     │
//! executor::execute_plan          ← guard, write, settle, read back, retry status once
//!     │
//! contamination::detect_contamination ← full-population pre/post diff
//!     │
//! report::MismatchReport          ← in-source-not-target / in-target-not-source
//! ```

pub mod config;
pub mod contamination;
pub mod engine;
pub mod error;
pub mod executor;
pub mod grade;
pub mod matcher;
pub mod prompt;
pub mod record;
pub mod report;
pub mod session;
pub mod status;
pub mod surface;
pub mod validator;

pub use config::{
    ConfigError, DEFAULT_CONFIG_FILE, EngineConfig, SettleConfig, StatusColumnMode,
    validate_total_marks,
};
pub use contamination::{ChangeKind, ContaminationWarning, detect_contamination};
pub use engine::{DEFAULT_ROSTER_ID, RunOutcome, RunSummary, run_batch, snapshot_digest};
pub use error::{EngineError, RecordFailure, SurfaceError};
pub use executor::{StatusAction, UpdateOutcome, execute_entry, execute_plan};
pub use grade::{Grade, GradeError};
pub use matcher::{MatchOutcome, MatchStrategy, match_records};
pub use prompt::{PromptChannel, PromptError, PromptReply, PromptRequest, PromptResponder};
pub use record::{
    MatchResult, PositionalHandle, RecordError, SourceRecord, SourceUnmatchedReason,
    TargetRecord, TargetUnmatchedReason, UNKNOWN_NAME, UnmatchedSourceRecord,
    UnmatchedTargetRecord, UpdatePlanEntry, split_composite,
};
pub use report::{
    ContaminationLine, GuardFailureLine, MismatchReport, SourceOnlyLine, TargetOnlyLine,
    VerificationFailureLine,
};
pub use session::{CancelToken, Session};
pub use status::{
    OptionMatchMethod, Status, StatusOptionMatch, StatusReading, UnknownStatus, normalize_status,
    select_status_option,
};
pub use surface::{SnapshotCollector, TargetMutator, TargetSurface};
pub use validator::{HandleCorrection, ValidationOutcome, revalidate};

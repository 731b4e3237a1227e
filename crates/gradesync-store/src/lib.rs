//! # gradesync-store
//!
//! File-backed collaborators for the reconciliation engine.
//!
//! - JSONL roster loading with row-level skip warnings
//! - A JSON document target implementing the surface traits, persisted
//!   atomically under a lock file
//! - An append-only per-roster mismatch log
//!
//! ```text
//! roster.jsonl ──load_roster──▶ [SourceRecord]
//! target.json  ──mutate_target_file──▶ FileTarget (SnapshotCollector + TargetMutator)
//! MismatchReport ──ReportSink::append──▶ <dir>/<roster>_mismatch_log.txt
//! ```

pub mod files;
pub mod report_sink;
pub mod roster;
pub mod target_file;

pub use files::{
    FileLockGuard, LockError, LockStamp, TextFileError, WriteError, lock_path_for, read_text,
    replace_file,
};
pub use report_sink::{REPORT_FILE_SUFFIX, ReportSink, ReportSinkError, sanitize_roster_id};
pub use roster::{
    LoadedRoster, RosterError, RosterWarning, RosterWarningKind, load_roster, read_roster,
};
pub use target_file::{
    FileTarget, TargetDocument, TargetFileError, TargetMutationError, TargetRow,
    mutate_target_file, write_target_document,
};

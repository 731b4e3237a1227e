//! Append-only mismatch log, one file per roster.

use crate::files::{FileLockGuard, LockError, ensure_parent_dir};
use gradesync_core::MismatchReport;
use regex::Regex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const REPORT_FILE_SUFFIX: &str = "_mismatch_log.txt";

#[derive(Debug, thiserror::Error)]
pub enum ReportSinkError {
    #[error("report sink {0}")]
    Lock(#[from] LockError),

    #[error("failed to append report to {path}: {message}")]
    Io { path: String, message: String },
}

fn unsafe_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("file-name regex must compile"))
}

/// File-name-safe form of a roster id.
pub fn sanitize_roster_id(roster_id: &str) -> String {
    let cleaned = unsafe_chars_re().replace_all(roster_id.trim(), "_");
    let cleaned = cleaned.trim_matches(|c| c == '_' || c == '.');
    if cleaned.is_empty() {
        "roster".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Directory of per-roster logs. Each run appends a new timestamped
/// section; existing content is never rewritten.
#[derive(Debug, Clone)]
pub struct ReportSink {
    dir: PathBuf,
}

impl ReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, roster_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{REPORT_FILE_SUFFIX}", sanitize_roster_id(roster_id)))
    }

    /// Append `report` to its roster's log and return the log path.
    pub fn append(&self, report: &MismatchReport) -> Result<PathBuf, ReportSinkError> {
        let path = self.path_for(&report.roster_id);
        let _guard = FileLockGuard::acquire(&path, "report")?;
        append_text(&path, &report.render_text())?;
        tracing::info!(path = %path.display(), issues = report.issue_count(), "mismatch report appended");
        Ok(path)
    }
}

fn append_text(path: &Path, text: &str) -> Result<(), ReportSinkError> {
    let io_err = |e: std::io::Error| ReportSinkError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    ensure_parent_dir(path).map_err(io_err)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    writeln!(file, "{text}").map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

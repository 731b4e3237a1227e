//! JSONL roster loading: one JSON object per roster row.
//!
//! Column keys follow the spreadsheet exports rosters usually come from, so
//! both `id` and `ID #` are accepted. Rows with a missing or malformed id or
//! grade are skipped with a warning; only unreadable files fail the load.

use crate::files::{TextFileError, read_text};
use gradesync_core::{Grade, SourceRecord, Status, StatusReading};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::BufRead;
use std::path::Path;

const SERIAL_KEYS: &[&str] = &["serial", "Sl #"];
const ID_KEYS: &[&str] = &["id", "ID #"];
const NAME_KEYS: &[&str] = &["name", "Name"];
const GRADE_KEYS: &[&str] = &["grade", "total", "Total"];
const STATUS_KEYS: &[&str] = &["status", "Status"];

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("roster line {line}: {message}")]
    Line { line: usize, message: String },

    #[error(transparent)]
    File(#[from] TextFileError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RosterWarningKind {
    SkippedRow,
    UnrecognizedStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterWarning {
    pub line: usize,
    pub kind: RosterWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedRoster {
    pub records: Vec<SourceRecord>,
    /// Any row carried a status key.
    pub has_status_column: bool,
    pub warnings: Vec<RosterWarning>,
}

impl LoadedRoster {
    fn warn(&mut self, line: usize, kind: RosterWarningKind, message: String) {
        tracing::warn!(line, kind = ?kind, "{message}");
        self.warnings.push(RosterWarning {
            line,
            kind,
            message,
        });
    }
}

/// Read a roster from JSONL text. Blank lines and `#` comments are ignored.
pub fn read_roster(reader: impl BufRead) -> Result<LoadedRoster, RosterError> {
    let mut roster = LoadedRoster::default();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| RosterError::Line {
            line: line_no,
            message: e.to_string(),
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let row = match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(row)) => row,
            Ok(_) => {
                roster.warn(line_no, RosterWarningKind::SkippedRow, "row is not a JSON object".into());
                continue;
            }
            Err(err) => {
                roster.warn(line_no, RosterWarningKind::SkippedRow, format!("invalid JSON: {err}"));
                continue;
            }
        };

        if lookup(&row, STATUS_KEYS).is_some() {
            roster.has_status_column = true;
        }
        match parse_row(&row) {
            Ok((record, reading)) => {
                if let StatusReading::Unrecognized(raw) = &reading {
                    roster.warn(
                        line_no,
                        RosterWarningKind::UnrecognizedStatus,
                        format!("unrecognized status {raw:?} for id {}; using Present", record.id()),
                    );
                }
                roster.records.push(record);
            }
            Err(message) => roster.warn(line_no, RosterWarningKind::SkippedRow, message),
        }
    }

    tracing::info!(
        rows = roster.records.len(),
        skipped = roster
            .warnings
            .iter()
            .filter(|w| w.kind == RosterWarningKind::SkippedRow)
            .count(),
        has_status_column = roster.has_status_column,
        "roster loaded"
    );
    Ok(roster)
}

/// Load a roster file, rejecting NUL bytes and invalid UTF-8 up front.
pub fn load_roster(path: impl AsRef<Path>) -> Result<LoadedRoster, RosterError> {
    let path = path.as_ref();
    let text = read_text(path)?;
    read_roster(text.as_bytes())
}

fn lookup<'a>(row: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| row.get(*key))
}

/// Text form of a scalar cell. Whole floats lose their `.0` so spreadsheet
/// ids like `20101001.0` read as `20101001`.
fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Some(int.to_string())
            } else if let Some(float) = number.as_f64()
                && float.fract() == 0.0
                && float.abs() < 1e15
            {
                Some(format!("{float:.0}"))
            } else {
                Some(number.to_string())
            }
        }
        _ => None,
    }
}

fn parse_grade(value: &Value) -> Result<Grade, String> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| format!("grade {number} is not representable"))
            .and_then(|float| Grade::from_f64(float).map_err(|e| e.to_string())),
        Value::String(text) => Grade::from_decimal_str(text).map_err(|e| e.to_string()),
        Value::Null => Err("grade is empty".to_string()),
        other => Err(format!("grade has unsupported type: {other}")),
    }
}

fn parse_row(row: &Map<String, Value>) -> Result<(SourceRecord, StatusReading), String> {
    let id = lookup(row, ID_KEYS)
        .and_then(cell_text)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| "row has no id".to_string())?;
    let grade = lookup(row, GRADE_KEYS)
        .ok_or_else(|| format!("row {id} has no grade"))
        .and_then(|value| parse_grade(value).map_err(|e| format!("row {id}: {e}")))?;
    let serial = lookup(row, SERIAL_KEYS).and_then(cell_text).unwrap_or_default();
    let name = lookup(row, NAME_KEYS).and_then(cell_text).unwrap_or_default();
    let status_text = lookup(row, STATUS_KEYS).and_then(cell_text);
    let reading = Status::read_cell(status_text.as_deref());

    let record = SourceRecord::new(serial, id, name, grade, reading.status())
        .map_err(|e| e.to_string())?;
    Ok((record, reading))
}

//! A target surface backed by a JSON document on disk.
//!
//! The document holds rendered rows (`student` composite, `marks`,
//! `status`), the status option list offered by every row's control, and
//! an optional total-marks field. Mutations apply in memory; callers
//! persist through [`mutate_target_file`], which holds `<path>.lock` for the
//! whole load-mutate-save cycle.

use crate::files::{FileLockGuard, LockError, TextFileError, WriteError, read_text, replace_file};
use gradesync_core::{PositionalHandle, SnapshotCollector, SurfaceError, TargetMutator, TargetRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_status_options() -> Vec<String> {
    ["Present", "Absent", "On-Hold"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRow {
    /// Rendered `"{id}-{name}"` identity.
    pub student: String,
    #[serde(default)]
    pub marks: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDocument {
    /// `None` when the target has no total-marks field at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_marks: Option<String>,
    #[serde(default = "default_status_options")]
    pub status_options: Vec<String>,
    #[serde(default)]
    pub rows: Vec<TargetRow>,
}

impl Default for TargetDocument {
    fn default() -> Self {
        Self {
            total_marks: None,
            status_options: default_status_options(),
            rows: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TargetFileError {
    #[error(transparent)]
    Read(#[from] TextFileError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("serialization error: {0}")]
    Serialize(String),
}

/// In-memory view of a target file, mutated through the surface traits.
#[derive(Debug, Clone)]
pub struct FileTarget {
    document: TargetDocument,
    open_control: Option<usize>,
    changed: bool,
}

impl FileTarget {
    pub fn new(document: TargetDocument) -> Self {
        Self {
            document,
            open_control: None,
            changed: false,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TargetFileError> {
        let path = path.as_ref();
        let text = read_text(path)?;
        let document: TargetDocument =
            serde_json::from_str(&text).map_err(|e| TargetFileError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::new(document))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TargetFileError> {
        let mut rendered = serde_json::to_string_pretty(&self.document)
            .map_err(|e| TargetFileError::Serialize(e.to_string()))?;
        rendered.push('\n');
        replace_file(path.as_ref(), rendered.as_bytes())?;
        Ok(())
    }

    pub fn document(&self) -> &TargetDocument {
        &self.document
    }

    /// Whether any write landed since load.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    fn row(&self, handle: PositionalHandle) -> Result<&TargetRow, SurfaceError> {
        self.document
            .rows
            .get(handle.index())
            .ok_or(SurfaceError::NoSuchRow(handle))
    }

    fn row_mut(&mut self, handle: PositionalHandle) -> Result<&mut TargetRow, SurfaceError> {
        self.document
            .rows
            .get_mut(handle.index())
            .ok_or(SurfaceError::NoSuchRow(handle))
    }
}

impl SnapshotCollector for FileTarget {
    fn collect(&mut self) -> Result<Vec<TargetRecord>, SurfaceError> {
        Ok(self
            .document
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                TargetRecord::from_composite(PositionalHandle(idx), &row.student, &row.status)
                    .with_grade(row.marks.clone())
            })
            .collect())
    }
}

impl TargetMutator for FileTarget {
    fn read_identity(&mut self, handle: PositionalHandle) -> Result<Option<String>, SurfaceError> {
        Ok(self
            .document
            .rows
            .get(handle.index())
            .map(|row| row.student.clone()))
    }

    fn write_grade(&mut self, handle: PositionalHandle, value: &str) -> Result<(), SurfaceError> {
        let row = self.row_mut(handle)?;
        if row.marks != value {
            row.marks = value.to_string();
            self.changed = true;
        }
        Ok(())
    }

    fn read_grade(&mut self, handle: PositionalHandle) -> Result<String, SurfaceError> {
        Ok(self.row(handle)?.marks.clone())
    }

    fn open_status_control(
        &mut self,
        handle: PositionalHandle,
    ) -> Result<Vec<String>, SurfaceError> {
        self.row(handle)?;
        self.open_control = Some(handle.index());
        Ok(self.document.status_options.clone())
    }

    fn select_status_option(&mut self, option: &str) -> Result<(), SurfaceError> {
        let idx = self.open_control.ok_or(SurfaceError::NoOpenControl)?;
        if !self.document.status_options.iter().any(|o| o == option) {
            return Err(SurfaceError::NoSuchOption(option.to_string()));
        }
        let row = self.row_mut(PositionalHandle(idx))?;
        if row.status != option {
            row.status = option.to_string();
            self.changed = true;
        }
        Ok(())
    }

    fn close_status_control(&mut self) -> Result<(), SurfaceError> {
        self.open_control = None;
        Ok(())
    }

    fn read_status(&mut self, handle: PositionalHandle) -> Result<String, SurfaceError> {
        Ok(self.row(handle)?.status.clone())
    }

    fn set_total_marks(&mut self, value: &str) -> Result<bool, SurfaceError> {
        let Some(total) = self.document.total_marks.as_mut() else {
            return Ok(false);
        };
        if total.as_str() != value {
            *total = value.to_string();
            self.changed = true;
        }
        Ok(true)
    }
}

/// Failure of one [`mutate_target_file`] run. `Mutation` carries the
/// caller's own error; the file is untouched in every case.
#[derive(Debug, thiserror::Error)]
pub enum TargetMutationError<E> {
    #[error("target {0}")]
    Lock(LockError),

    #[error(transparent)]
    Target(TargetFileError),

    #[error("{0}")]
    Mutation(E),
}

/// Run one lock-scoped mutation against a target file.
///
/// The file is saved before the lock is released when the mutator returns
/// `Ok` and any write changed the document. A mutator error leaves the file
/// untouched.
pub fn mutate_target_file<T, E, F>(
    path: impl AsRef<Path>,
    mutator: F,
) -> Result<T, TargetMutationError<E>>
where
    F: FnOnce(&mut FileTarget) -> Result<T, E>,
{
    let path = path.as_ref();
    let _guard = FileLockGuard::acquire(path, "apply").map_err(TargetMutationError::Lock)?;

    let mut target = FileTarget::load(path).map_err(TargetMutationError::Target)?;
    let value = mutator(&mut target).map_err(TargetMutationError::Mutation)?;
    if target.is_changed() {
        target.save(path).map_err(TargetMutationError::Target)?;
        tracing::debug!(path = %path.display(), "target file saved");
    }
    Ok(value)
}

/// Write a fresh target document; used by fixtures and `init`.
pub fn write_target_document(
    path: impl AsRef<Path>,
    document: &TargetDocument,
) -> Result<(), TargetFileError> {
    FileTarget::new(document.clone()).save(path)
}

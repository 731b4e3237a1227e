//! Collaborator seams for the target surface.
//!
//! A target is an externally rendered, asynchronously updating surface. The
//! engine reads it through [`SnapshotCollector`] and writes it through
//! [`TargetMutator`]; it never caches positions across snapshots.

use crate::error::SurfaceError;
use crate::record::{PositionalHandle, TargetRecord};

/// Reads the full rendered population.
pub trait SnapshotCollector {
    /// Take a full snapshot reflecting the live rendered state. Repeatable.
    fn collect(&mut self) -> Result<Vec<TargetRecord>, SurfaceError>;
}

/// Field-level access to one rendered row, addressed by position.
pub trait TargetMutator {
    /// Identity currently rendered at `handle`, `None` past the end.
    fn read_identity(&mut self, handle: PositionalHandle) -> Result<Option<String>, SurfaceError>;

    fn write_grade(&mut self, handle: PositionalHandle, value: &str) -> Result<(), SurfaceError>;

    fn read_grade(&mut self, handle: PositionalHandle) -> Result<String, SurfaceError>;

    /// Open the status control at `handle` and return its option labels in
    /// render order.
    fn open_status_control(&mut self, handle: PositionalHandle)
    -> Result<Vec<String>, SurfaceError>;

    /// Select an option of the currently open status control.
    fn select_status_option(&mut self, option: &str) -> Result<(), SurfaceError>;

    /// Dismiss any open status control.
    fn close_status_control(&mut self) -> Result<(), SurfaceError>;

    fn read_status(&mut self, handle: PositionalHandle) -> Result<String, SurfaceError>;

    /// Write the total-marks normalization field. Returns `false` when the
    /// surface has no such field.
    fn set_total_marks(&mut self, _value: &str) -> Result<bool, SurfaceError> {
        Ok(false)
    }
}

/// A surface that can be both observed and mutated.
pub trait TargetSurface: SnapshotCollector + TargetMutator {}

impl<T: SnapshotCollector + TargetMutator> TargetSurface for T {}

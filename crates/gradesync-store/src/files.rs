//! File plumbing shared by the target document and the mismatch logs:
//! holder-stamped lock files, validated text reads, and replace-by-rename
//! writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// `<path>.lock`, the sidecar held while a file is being mutated.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock: OsString = path.as_os_str().to_os_string();
    lock.push(".lock");
    PathBuf::from(lock)
}

/// Who holds a lock. Written as JSON into the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStamp {
    pub pid: u32,
    /// What the holder is doing, e.g. `apply` or `report`.
    pub purpose: String,
    pub acquired_at: DateTime<Utc>,
}

fn held_by(holder: &Option<LockStamp>) -> String {
    match holder {
        Some(stamp) => format!(
            " by pid {} ({}) since {}",
            stamp.pid,
            stamp.purpose,
            stamp.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// Another run holds the lock. Remove a stale lock file by hand.
    #[error("{} is locked{}", lock_path.display(), held_by(holder))]
    Busy {
        lock_path: PathBuf,
        holder: Option<LockStamp>,
    },

    #[error("cannot create lock {}: {message}", lock_path.display())]
    Io { lock_path: PathBuf, message: String },
}

/// Exclusive hold on `<path>.lock`; the lock file is removed on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    lock_path: PathBuf,
}

impl FileLockGuard {
    pub fn acquire(path: &Path, purpose: &str) -> Result<Self, LockError> {
        let lock_path = lock_path_for(path);
        if let Err(err) = ensure_parent_dir(&lock_path) {
            return Err(LockError::Io {
                lock_path,
                message: err.to_string(),
            });
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_stamp(&lock_path);
                return Err(LockError::Busy { lock_path, holder });
            }
            Err(err) => {
                return Err(LockError::Io {
                    lock_path,
                    message: err.to_string(),
                });
            }
        };

        let stamp = LockStamp {
            pid: std::process::id(),
            purpose: purpose.to_string(),
            acquired_at: Utc::now(),
        };
        // The stamp is informational; an unstamped lock still excludes.
        if let Err(err) = serde_json::to_writer(&mut file, &stamp) {
            tracing::debug!(lock = %lock_path.display(), "lock stamp not written: {err}");
        }
        Ok(Self { lock_path })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn read_stamp(lock_path: &Path) -> Option<LockStamp> {
    let bytes = fs::read(lock_path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Create the parent directory of `path` when it has one.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TextFileError {
    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("{} contains NUL byte(s)", path.display())]
    Nul { path: PathBuf },

    #[error("{} is not valid UTF-8", path.display())]
    NotUtf8 { path: PathBuf },
}

/// Read a roster or target file; NUL bytes and invalid UTF-8 are rejected.
pub fn read_text(path: &Path) -> Result<String, TextFileError> {
    let bytes = fs::read(path).map_err(|source| TextFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.contains(&0) {
        return Err(TextFileError::Nul {
            path: path.to_path_buf(),
        });
    }
    String::from_utf8(bytes).map_err(|_| TextFileError::NotUtf8 {
        path: path.to_path_buf(),
    })
}

#[derive(Debug, thiserror::Error)]
#[error("cannot write {}: {source}", path.display())]
pub struct WriteError {
    pub path: PathBuf,
    pub source: io::Error,
}

impl WriteError {
    fn at(path: &Path) -> impl FnOnce(io::Error) -> WriteError {
        let path = path.to_path_buf();
        move |source| WriteError { path, source }
    }
}

/// Replace `path` with `contents`. The bytes are synced to a sibling
/// staging file, renamed over `path`, and the directory entry is synced.
pub fn replace_file(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    ensure_parent_dir(path).map_err(WriteError::at(path))?;

    let staged = staging_path(path);
    let staged_then_renamed = stage(&staged, contents).and_then(|()| fs::rename(&staged, path));
    if let Err(source) = staged_then_renamed {
        let _ = fs::remove_file(&staged);
        return Err(WriteError {
            path: staged,
            source,
        });
    }

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        File::open(dir)
            .and_then(|handle| handle.sync_all())
            .map_err(WriteError::at(dir))?;
    }
    Ok(())
}

fn stage(staged: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(staged)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// `.<name>.<pid>.staged` next to `path`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_else(|| path.as_os_str()));
    name.push(format!(".{}.staged", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_path;

    #[test]
    fn second_lock_is_busy_and_names_the_holder() {
        let path = temp_path("lock", "json");
        let first = FileLockGuard::acquire(&path, "apply").expect("first lock should succeed");
        let second = FileLockGuard::acquire(&path, "report").expect_err("second lock must be busy");
        match &second {
            LockError::Busy { holder, .. } => {
                let holder = holder.as_ref().expect("holder stamp should be readable");
                assert_eq!(holder.pid, std::process::id());
                assert_eq!(holder.purpose, "apply");
            }
            other => panic!("expected busy lock, got {other:?}"),
        }
        assert!(second.to_string().contains("(apply)"));

        drop(first);
        assert!(!lock_path_for(&path).exists());
        FileLockGuard::acquire(&path, "apply").expect("lock should be free again");
    }

    #[test]
    fn unstamped_lock_is_still_busy() {
        let path = temp_path("lock-bare", "json");
        fs::write(lock_path_for(&path), b"").expect("bare lock should write");
        let err = FileLockGuard::acquire(&path, "apply").expect_err("bare lock must exclude");
        assert!(matches!(err, LockError::Busy { holder: None, .. }));
        let _ = fs::remove_file(lock_path_for(&path));
    }

    #[test]
    fn replace_file_swaps_content_and_leaves_no_staging_file() {
        let path = temp_path("replace", "json");
        replace_file(&path, b"first").expect("first write");
        replace_file(&path, b"second").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("file should exist"), "second");
        assert!(!staging_path(&path).exists());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn read_text_flags_nul_and_non_utf8() {
        let path = temp_path("text", "jsonl");
        fs::write(&path, b"{}\n\0").expect("fixture should write");
        assert!(matches!(read_text(&path), Err(TextFileError::Nul { .. })));
        fs::write(&path, [0xff, 0xfe]).expect("fixture should write");
        assert!(matches!(read_text(&path), Err(TextFileError::NotUtf8 { .. })));
        fs::write(&path, b"{}\n").expect("fixture should write");
        assert_eq!(read_text(&path).expect("text should read"), "{}\n");
        let _ = fs::remove_file(path);
    }
}

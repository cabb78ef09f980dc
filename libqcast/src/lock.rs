//! Run lock for single-scheduler execution
//!
//! A marker file holding `{pid, started_at}` guards each run of the
//! scheduler. A second invocation while the marker exists is a silent
//! no-op, so overlapping cron ticks cannot double-process the queue.
//! Markers older than 30 minutes belong to a dead run and are replaced.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

const STALE_AFTER_MINUTES: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
struct LockMarker {
    pid: u32,
    started_at: DateTime<Utc>,
}

pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Try to take the lock.
    ///
    /// Returns `Ok(None)` when another live run holds it; that is the
    /// caller's cue to exit quietly, not an error.
    pub fn acquire(&self) -> Result<Option<RunLockGuard>> {
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(mut file) => {
                    let marker = LockMarker {
                        pid: std::process::id(),
                        started_at: Utc::now(),
                    };
                    let body =
                        serde_json::to_string(&marker).map_err(StoreError::ParseError)?;
                    file.write_all(body.as_bytes())
                        .map_err(StoreError::WriteError)?;
                    debug!("Acquired run lock {}", self.path.display());
                    return Ok(Some(RunLockGuard {
                        path: self.path.clone(),
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.marker_is_stale() {
                        warn!(
                            "Removing stale run lock {} (older than {} minutes)",
                            self.path.display(),
                            STALE_AFTER_MINUTES
                        );
                        let _ = std::fs::remove_file(&self.path);
                        continue;
                    }
                    debug!("Run lock {} held by another instance", self.path.display());
                    return Ok(None);
                }
                Err(e) => return Err(StoreError::WriteError(e).into()),
            }
        }
    }

    fn marker_is_stale(&self) -> bool {
        let marker: Option<LockMarker> = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok());

        match marker {
            Some(marker) => {
                Utc::now() - marker.started_at > chrono::Duration::minutes(STALE_AFTER_MINUTES)
            }
            // Unreadable marker: treat as stale so a truncated write cannot
            // wedge the scheduler forever
            None => true,
        }
    }
}

/// Releases the run lock on drop
pub struct RunLockGuard {
    path: PathBuf,
}

impl RunLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(self) {
        // Drop does the work
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove run lock {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::new(dir.path().join("scheduler.lock"));

        let guard = lock.acquire().unwrap();
        assert!(guard.is_some());
        assert!(dir.path().join("scheduler.lock").exists());

        drop(guard);
        assert!(!dir.path().join("scheduler.lock").exists());
    }

    #[test]
    fn test_second_acquire_is_not_held() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::new(dir.path().join("scheduler.lock"));

        let _guard = lock.acquire().unwrap().unwrap();

        let second = RunLock::new(dir.path().join("scheduler.lock"));
        assert!(second.acquire().unwrap().is_none());
    }

    #[test]
    fn test_reacquire_after_release() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::new(dir.path().join("scheduler.lock"));

        let guard = lock.acquire().unwrap().unwrap();
        guard.release();

        assert!(lock.acquire().unwrap().is_some());
    }

    #[test]
    fn test_stale_marker_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scheduler.lock");

        let stale = LockMarker {
            pid: 99999,
            started_at: Utc::now() - chrono::Duration::minutes(STALE_AFTER_MINUTES + 5),
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = RunLock::new(&path);
        assert!(lock.acquire().unwrap().is_some());
    }

    #[test]
    fn test_fresh_marker_is_respected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scheduler.lock");

        let fresh = LockMarker {
            pid: 99999,
            started_at: Utc::now() - chrono::Duration::minutes(1),
        };
        std::fs::write(&path, serde_json::to_string(&fresh).unwrap()).unwrap();

        let lock = RunLock::new(&path);
        assert!(lock.acquire().unwrap().is_none());
    }

    #[test]
    fn test_unreadable_marker_treated_as_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scheduler.lock");
        std::fs::write(&path, "garbage").unwrap();

        let lock = RunLock::new(&path);
        assert!(lock.acquire().unwrap().is_some());
    }
}

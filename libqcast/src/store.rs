//! Durable queue store
//!
//! The queue is a single JSON document (`{version, posts}`) rewritten whole
//! on every mutation. Mutations hold an exclusive sidecar lock file and
//! persist through a temp file plus rename, so readers never observe a
//! partial document. Plain reads skip the lock and accept an
//! eventually-consistent view.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::types::{Post, PostStatus, Queue};

const LOCK_WAIT_ATTEMPTS: u32 = 20;
const LOCK_WAIT_INTERVAL: Duration = Duration::from_millis(50);

/// A sidecar lock older than this belongs to a dead writer
const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);

pub struct QueueStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "queue.json".into());
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the queue. A missing file is an empty v1 queue, not an error.
    pub fn load(&self) -> Result<Queue> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Queue::default());
            }
            Err(e) => return Err(StoreError::ReadError(e).into()),
        };
        let queue: Queue = serde_json::from_str(&content).map_err(StoreError::ParseError)?;
        Ok(queue)
    }

    /// Pending posts whose scheduled time has arrived
    pub fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let queue = self.load()?;
        Ok(queue
            .posts
            .into_iter()
            .filter(|p| p.status == PostStatus::Pending && p.scheduled_at <= now)
            .collect())
    }

    pub async fn append(&self, post: Post) -> Result<()> {
        self.update(|queue| queue.posts.push(post)).await
    }

    /// Lock, load, apply `f`, persist atomically, unlock.
    ///
    /// All mutations go through here so the lock discipline and the atomic
    /// rewrite live in one place.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Queue) -> R) -> Result<R> {
        let _guard = self.acquire_write_lock().await?;
        let mut queue = self.load()?;
        let result = f(&mut queue);
        self.persist(&queue)?;
        Ok(result)
    }

    /// Remove terminal posts older than the retention window.
    ///
    /// Returns the removed posts so the caller can delete their staged
    /// media. Non-terminal posts are never removed regardless of age.
    pub async fn remove_terminal_older_than(
        &self,
        retention: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Post>> {
        let cutoff = now - retention;
        self.update(move |queue| {
            let (removed, kept): (Vec<Post>, Vec<Post>) = queue
                .posts
                .drain(..)
                .partition(|p| p.status.is_terminal() && p.retention_anchor() < cutoff);
            queue.posts = kept;
            removed
        })
        .await
    }

    fn persist(&self, queue: &Queue) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(StoreError::WriteError)?;

        let json = serde_json::to_string_pretty(queue).map_err(StoreError::ParseError)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(StoreError::WriteError)?;
        temp.write_all(json.as_bytes())
            .map_err(StoreError::WriteError)?;
        temp.persist(&self.path)
            .map_err(|e| StoreError::WriteError(e.error))?;
        debug!("Persisted queue with {} posts", queue.posts.len());
        Ok(())
    }

    async fn acquire_write_lock(&self) -> Result<WriteLockGuard> {
        for _ in 0..LOCK_WAIT_ATTEMPTS {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(WriteLockGuard {
                        path: self.lock_path.clone(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.lock_is_stale() {
                        warn!(
                            "Removing stale queue lock {}",
                            self.lock_path.display()
                        );
                        let _ = std::fs::remove_file(&self.lock_path);
                        continue;
                    }
                    sleep(LOCK_WAIT_INTERVAL).await;
                }
                Err(e) => return Err(StoreError::WriteError(e).into()),
            }
        }
        Err(StoreError::Locked(format!(
            "gave up waiting for {}",
            self.lock_path.display()
        ))
        .into())
    }

    fn lock_is_stale(&self) -> bool {
        std::fs::metadata(&self.lock_path)
            .and_then(|m| m.modified())
            .map(|modified| {
                modified
                    .elapsed()
                    .map(|age| age > LOCK_STALE_AFTER)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

struct WriteLockGuard {
    path: PathBuf,
}

impl Drop for WriteLockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

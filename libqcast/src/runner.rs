//! The scheduler run loop
//!
//! One `run` claims the run lock, marks every due post `posting`, publishes
//! each to its target platforms in order, and writes all outcomes back in a
//! single queue mutation. A run that finds the lock held exits quietly so
//! overlapping cron ticks cannot double-post.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{QcastError, Result, StoreError};
use crate::lock::RunLock;
use crate::platforms::Platform;
use crate::protocol::{classify, PostKind};
use crate::staging;
use crate::store::QueueStore;
use crate::types::{PlatformResult, Post, PostStatus};

/// Terminal posts older than this are removed by cleanup
pub const RETENTION_DAYS: i64 = 7;

pub struct Scheduler {
    store: QueueStore,
    lock: RunLock,
    staged_root: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    /// False when another run held the lock and this one did nothing
    pub ran: bool,
    pub due: usize,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub partial: Vec<String>,
}

impl RunReport {
    fn skipped() -> Self {
        Self {
            ran: false,
            due: 0,
            completed: Vec::new(),
            failed: Vec::new(),
            partial: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<String>,
}

impl Scheduler {
    pub fn new(
        queue_path: impl Into<PathBuf>,
        lock_path: impl Into<PathBuf>,
        staged_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store: QueueStore::new(queue_path),
            lock: RunLock::new(lock_path),
            staged_root: staged_root.into(),
        }
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Process every post due at `now`.
    pub async fn run(&self, platforms: &[Box<dyn Platform>], now: DateTime<Utc>) -> Result<RunReport> {
        let _guard = match self.lock.acquire()? {
            Some(guard) => guard,
            None => {
                info!("Another scheduler run is in progress; nothing to do");
                return Ok(RunReport::skipped());
            }
        };

        let claimed = self
            .store
            .update(move |queue| {
                let mut claimed = Vec::new();
                for post in queue.posts.iter_mut() {
                    if post.status == PostStatus::Pending && post.scheduled_at <= now {
                        post.status = PostStatus::Posting;
                        claimed.push(post.clone());
                    }
                }
                claimed
            })
            .await?;

        if claimed.is_empty() {
            info!("No posts due");
        } else {
            info!("Processing {} due post(s)", claimed.len());
        }

        let mut report = RunReport {
            ran: true,
            due: claimed.len(),
            completed: Vec::new(),
            failed: Vec::new(),
            partial: Vec::new(),
        };
        let mut outcomes = Vec::with_capacity(claimed.len());

        for post in &claimed {
            let results = self.publish_post(post, platforms).await;
            let status = derive_status(&results);
            match status {
                PostStatus::Completed => report.completed.push(post.id.clone()),
                PostStatus::Partial => report.partial.push(post.id.clone()),
                _ => report.failed.push(post.id.clone()),
            }
            info!("Post {} finished as {}", post.id, status);
            outcomes.push((post.id.clone(), status, results, Utc::now()));
        }

        if !outcomes.is_empty() {
            self.store
                .update(move |queue| {
                    for (id, status, results, finished_at) in outcomes {
                        if let Some(post) = queue.posts.iter_mut().find(|p| p.id == id) {
                            post.status = status;
                            post.results = results;
                            post.completed_at = Some(finished_at);
                        }
                    }
                })
                .await?;
        }

        Ok(report)
    }

    async fn publish_post(
        &self,
        post: &Post,
        platforms: &[Box<dyn Platform>],
    ) -> BTreeMap<String, PlatformResult> {
        let kind = classify(&post.media);
        let mut results = BTreeMap::new();

        for name in &post.platforms {
            let result = match platforms.iter().find(|p| p.name() == name.as_str()) {
                None => {
                    warn!("Post {} targets unconfigured platform '{}'", post.id, name);
                    PlatformResult::failed(format!("Platform '{}' is not configured", name))
                }
                Some(platform) => {
                    if kind == PostKind::Text && !platform.supports_text_only() {
                        PlatformResult::failed(format!(
                            "{} does not support text-only posts",
                            name
                        ))
                    } else if kind == PostKind::MixedSet && !platform.supports_mixed_media() {
                        PlatformResult::failed(format!(
                            "{} does not support mixed image and video posts",
                            name
                        ))
                    } else {
                        info!("Publishing post {} to {}", post.id, name);
                        match platform.publish(&post.media, &post.caption).await {
                            Ok(outcome) => {
                                info!(
                                    "Post {} published to {} as {}",
                                    post.id, name, outcome.platform_post_id
                                );
                                PlatformResult::succeeded(
                                    outcome.platform_post_id,
                                    outcome.post_type,
                                )
                            }
                            Err(e) => {
                                warn!("Post {} failed on {}: {}", post.id, name, e);
                                PlatformResult::failed(e.to_string())
                            }
                        }
                    }
                }
            };
            results.insert(name.clone(), result);
        }
        results
    }

    /// Cancel a pending post and delete its staged media.
    pub async fn cancel(&self, post_id: &str) -> Result<Post> {
        let id = post_id.to_string();
        let post = self
            .store
            .update(move |queue| -> Result<Post> {
                let post = queue
                    .posts
                    .iter_mut()
                    .find(|p| p.id == id)
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;

                if !post.status.can_transition_to(PostStatus::Cancelled) {
                    return Err(QcastError::InvalidInput(format!(
                        "Post {} is {} and cannot be cancelled",
                        post.id, post.status
                    )));
                }
                post.status = PostStatus::Cancelled;
                post.completed_at = Some(Utc::now());
                Ok(post.clone())
            })
            .await??;

        staging::remove_staged(&post.id, &self.staged_root)?;
        info!("Cancelled post {}", post.id);
        Ok(post)
    }

    /// Remove terminal posts older than the retention window, staged media
    /// included.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let removed = self
            .store
            .remove_terminal_older_than(chrono::Duration::days(RETENTION_DAYS), now)
            .await?;

        let mut ids = Vec::with_capacity(removed.len());
        for post in &removed {
            staging::remove_staged(&post.id, &self.staged_root)?;
            ids.push(post.id.clone());
        }

        if ids.is_empty() {
            info!("Cleanup removed nothing");
        } else {
            info!("Cleanup removed {} post(s)", ids.len());
        }
        Ok(CleanupReport { removed: ids })
    }
}

/// Aggregate per-platform results into the post's final status
fn derive_status(results: &BTreeMap<String, PlatformResult>) -> PostStatus {
    let successes = results.values().filter(|r| r.success).count();
    if results.is_empty() || successes == 0 {
        PostStatus::Failed
    } else if successes == results.len() {
        PostStatus::Completed
    } else {
        PostStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockConfig, MockPlatform};
    use tempfile::TempDir;

    fn scheduler_in(dir: &TempDir) -> Scheduler {
        Scheduler::new(
            dir.path().join("queue.json"),
            dir.path().join("scheduler.lock"),
            dir.path().join("staged"),
        )
    }

    fn pending_post(scheduled_at: DateTime<Utc>, platforms: Vec<&str>) -> Post {
        Post::new(
            "caption".to_string(),
            platforms.into_iter().map(String::from).collect(),
            Vec::new(),
            scheduled_at,
            "UTC".to_string(),
        )
    }

    fn boxed(configs: Vec<MockConfig>) -> Vec<Box<dyn Platform>> {
        configs
            .into_iter()
            .map(|c| Box::new(MockPlatform::new(c)) as Box<dyn Platform>)
            .collect()
    }

    #[test]
    fn test_derive_status() {
        let mut results = BTreeMap::new();
        assert_eq!(derive_status(&results), PostStatus::Failed);

        results.insert(
            "a".to_string(),
            PlatformResult::succeeded("1".to_string(), "mock".to_string()),
        );
        assert_eq!(derive_status(&results), PostStatus::Completed);

        results.insert(
            "b".to_string(),
            PlatformResult::failed("rejected".to_string()),
        );
        assert_eq!(derive_status(&results), PostStatus::Partial);

        results.insert(
            "a".to_string(),
            PlatformResult::failed("rejected".to_string()),
        );
        assert_eq!(derive_status(&results), PostStatus::Failed);
    }

    #[tokio::test]
    async fn test_run_skips_when_lock_held() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_in(&dir);
        let lock = RunLock::new(dir.path().join("scheduler.lock"));
        let _guard = lock.acquire().unwrap().unwrap();

        let report = scheduler.run(&boxed(vec![]), Utc::now()).await.unwrap();
        assert!(!report.ran);
    }

    #[tokio::test]
    async fn test_run_releases_lock() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_in(&dir);

        scheduler.run(&boxed(vec![]), Utc::now()).await.unwrap();
        assert!(!dir.path().join("scheduler.lock").exists());
    }

    #[tokio::test]
    async fn test_run_unconfigured_platform_fails_post() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_in(&dir);
        let now = Utc::now();

        let post = pending_post(now - chrono::Duration::minutes(1), vec!["nostr"]);
        let id = post.id.clone();
        scheduler.store().append(post).await.unwrap();

        let report = scheduler.run(&boxed(vec![]), now).await.unwrap();
        assert_eq!(report.failed, vec![id.clone()]);

        let queue = scheduler.store().load().unwrap();
        let post = &queue.posts[0];
        assert_eq!(post.status, PostStatus::Failed);
        assert!(post.results["nostr"]
            .error
            .as_deref()
            .unwrap()
            .contains("not configured"));
        assert!(post.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_pending_post() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_in(&dir);

        let post = pending_post(Utc::now() + chrono::Duration::hours(1), vec!["mock"]);
        let id = post.id.clone();
        scheduler.store().append(post).await.unwrap();

        let cancelled = scheduler.cancel(&id).await.unwrap();
        assert_eq!(cancelled.status, PostStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_completed_post_rejected() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_in(&dir);

        let mut post = pending_post(Utc::now(), vec!["mock"]);
        post.status = PostStatus::Completed;
        let id = post.id.clone();
        scheduler.store().append(post).await.unwrap();

        let err = scheduler.cancel(&id).await.unwrap_err();
        assert!(matches!(err, QcastError::InvalidInput(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_cancel_missing_post() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_in(&dir);

        let err = scheduler.cancel("post_missing0000").await.unwrap_err();
        assert!(matches!(
            err,
            QcastError::Store(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_terminal_posts_and_media() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_in(&dir);
        let now = Utc::now();

        let mut old = pending_post(now - chrono::Duration::days(10), vec!["mock"]);
        old.status = PostStatus::Completed;
        old.completed_at = Some(now - chrono::Duration::days(9));
        let old_id = old.id.clone();

        let staged_dir = dir.path().join("staged").join(&old_id);
        std::fs::create_dir_all(&staged_dir).unwrap();
        std::fs::write(staged_dir.join("photo.jpg"), b"bytes").unwrap();

        scheduler.store().append(old).await.unwrap();

        let report = scheduler.cleanup(now).await.unwrap();
        assert_eq!(report.removed, vec![old_id]);
        assert!(!staged_dir.exists());
    }
}

//! Core types for qcast

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current on-disk queue document version
pub const QUEUE_VERSION: u32 = 1;

/// Generate a new post ID: `post_` plus 12 hex characters
pub fn generate_post_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("post_{}", &uuid[..12])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    /// IANA timezone name the user scheduled in (informational only)
    pub timezone: String,
    pub completed_at: Option<DateTime<Utc>>,
    /// Target platforms in dispatch order
    pub platforms: Vec<String>,
    pub caption: String,
    /// Staged media in presentation order; empty for text-only posts
    pub media: Vec<MediaItem>,
    /// Per-platform outcome, keyed by platform name
    pub results: BTreeMap<String, PlatformResult>,
}

impl Post {
    pub fn new(
        caption: String,
        platforms: Vec<String>,
        media: Vec<MediaItem>,
        scheduled_at: DateTime<Utc>,
        timezone: String,
    ) -> Self {
        Self {
            id: generate_post_id(),
            status: PostStatus::Pending,
            created_at: Utc::now(),
            scheduled_at,
            timezone,
            completed_at: None,
            platforms,
            caption,
            media,
            results: BTreeMap::new(),
        }
    }

    /// The timestamp cleanup measures retention against
    pub fn retention_anchor(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posting,
    Completed,
    Failed,
    Partial,
    Cancelled,
}

impl PostStatus {
    /// Terminal statuses never change again (except cleanup deletion)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PostStatus::Completed | PostStatus::Failed | PostStatus::Partial | PostStatus::Cancelled
        )
    }

    /// Whether a transition to `next` is legal.
    ///
    /// The machine is one-directional: pending may move to posting or
    /// cancelled, posting may move to any outcome status, and terminal
    /// statuses may not move at all.
    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        match self {
            PostStatus::Pending => matches!(next, PostStatus::Posting | PostStatus::Cancelled),
            PostStatus::Posting => matches!(
                next,
                PostStatus::Completed | PostStatus::Failed | PostStatus::Partial
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostStatus::Pending => write!(f, "pending"),
            PostStatus::Posting => write!(f, "posting"),
            PostStatus::Completed => write!(f, "completed"),
            PostStatus::Failed => write!(f, "failed"),
            PostStatus::Partial => write!(f, "partial"),
            PostStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    /// Classify a file by extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "webp" => Some(Self::Image),
            "mp4" | "mov" | "webm" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Image => write!(f, "image"),
            MediaType::Video => write!(f, "video"),
        }
    }
}

/// A staged media file belonging to a post
///
/// `path` points into the post's staging directory; the run loop only ever
/// reads staged copies, never `source_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub path: PathBuf,
    pub source_path: PathBuf,
    pub media_type: MediaType,
}

/// Outcome of publishing one post to one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformResult {
    pub success: bool,
    pub platform_post_id: Option<String>,
    /// Platform-specific post type (e.g. "photo", "carousel", "video")
    pub post_type: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub attempted_at: Option<DateTime<Utc>>,
}

impl PlatformResult {
    pub fn succeeded(platform_post_id: String, post_type: String) -> Self {
        Self {
            success: true,
            platform_post_id: Some(platform_post_id),
            post_type: Some(post_type),
            posted_at: Some(Utc::now()),
            error: None,
            attempted_at: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            platform_post_id: None,
            post_type: None,
            posted_at: None,
            error: Some(error),
            attempted_at: Some(Utc::now()),
        }
    }
}

/// The whole queue document, rewritten atomically on every mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub version: u32,
    pub posts: Vec<Post>,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            version: QUEUE_VERSION,
            posts: Vec::new(),
        }
    }
}

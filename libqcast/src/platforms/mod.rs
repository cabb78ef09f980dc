//! Platform abstraction and implementations
//!
//! Each adapter drives one platform's publish protocol end to end: media
//! upload, any remote processing wait, and the final publish call. The
//! scheduler only sees the `Platform` trait and a `PublishOutcome`.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::types::MediaItem;

pub mod facebook;
pub mod graph;
pub mod instagram;
pub mod tiktok;

// Mock platform is available for all builds (not just tests) to support
// integration tests
pub mod mock;

/// What a successful publish produced
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// Platform-specific post identifier
    pub platform_post_id: String,
    /// Platform-specific post type (e.g. "photo", "carousel", "video")
    pub post_type: String,
}

/// Unified interface over the publish protocols
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase platform identifier (e.g. "facebook")
    fn name(&self) -> &str;

    /// Whether a single post may mix images and videos
    fn supports_mixed_media(&self) -> bool;

    /// Whether a post with no media at all is publishable
    fn supports_text_only(&self) -> bool {
        false
    }

    /// Publish one post's media and caption.
    ///
    /// Drives the platform's full upload choreography, including any
    /// remote-processing polls. Implementations wrap every network step in
    /// the shared backoff executor; a returned error is already final for
    /// this run.
    async fn publish(&self, media: &[MediaItem], caption: &str) -> Result<PublishOutcome>;
}

/// Create adapters for all enabled platforms in the configuration
pub fn create_platforms(config: &Config) -> Result<Vec<Box<dyn Platform>>> {
    let mut platforms: Vec<Box<dyn Platform>> = Vec::new();

    if let Some(facebook_config) = &config.facebook {
        if facebook_config.enabled {
            tracing::info!("Creating Facebook platform client");
            let token = read_token_file(
                &facebook_config.expand_token_file_path(),
                "facebook",
            )?;
            platforms.push(Box::new(facebook::FacebookPlatform::new(
                facebook_config.page_id.clone(),
                token,
            )?));
        }
    }

    if let Some(instagram_config) = &config.instagram {
        if instagram_config.enabled {
            tracing::info!("Creating Instagram platform client");
            let token = read_token_file(
                &instagram_config.expand_token_file_path(),
                "instagram",
            )?;
            platforms.push(Box::new(instagram::InstagramPlatform::new(
                instagram_config.account_id.clone(),
                instagram_config.page_id.clone(),
                token,
            )?));
        }
    }

    if let Some(tiktok_config) = &config.tiktok {
        if tiktok_config.enabled {
            tracing::info!("Creating TikTok platform client");
            let token = read_token_file(&tiktok_config.expand_token_file_path(), "tiktok")?;
            platforms.push(Box::new(tiktok::TiktokPlatform::new(
                token,
                tiktok_config.privacy_level.clone(),
            )?));
        }
    }

    if platforms.is_empty() {
        tracing::warn!("No platforms are enabled in configuration");
    } else {
        tracing::info!("Created {} platform client(s)", platforms.len());
    }

    Ok(platforms)
}

/// Read a staged media file fully into memory.
///
/// A missing or unreadable staged file is a permanent validation failure,
/// not a network problem.
pub(crate) async fn read_media(item: &MediaItem) -> Result<Vec<u8>> {
    tokio::fs::read(&item.path).await.map_err(|e| {
        PlatformError::Validation(format!(
            "Cannot read staged media {}: {}",
            item.path.display(),
            e
        ))
        .into()
    })
}

pub(crate) fn file_name_of(item: &MediaItem) -> String {
    item.path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("media")
        .to_string()
}

/// Truncate a response body for an error message without splitting a
/// multi-byte character.
pub(crate) fn truncate_body(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn read_token_file(path: &std::path::Path, platform: &str) -> Result<String> {
    if !path.exists() {
        return Err(PlatformError::Authentication(format!(
            "{} token file not found: {}. Please create this file with your access token.",
            platform,
            path.display()
        ))
        .into());
    }

    let token = std::fs::read_to_string(path).map_err(|e| {
        PlatformError::Authentication(format!(
            "Failed to read {} token file {}: {}",
            platform,
            path.display(),
            e
        ))
    })?;
    Ok(token.trim().to_string())
}

//! Mock platform for testing
//!
//! Configurable success, permanent failure, or a burst of transient
//! failures before succeeding. Shared handles let tests inspect what was
//! published after the platform has been boxed behind the trait.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::platforms::{Platform, PublishOutcome};
use crate::types::MediaItem;

#[derive(Clone)]
pub struct MockConfig {
    pub name: String,
    pub supports_mixed_media: bool,
    pub supports_text_only: bool,
    /// Permanent failure returned on every attempt
    pub failure: Option<PlatformError>,
    /// Number of leading attempts that fail with a network error
    pub transient_failures: u32,
}

impl MockConfig {
    pub fn success(name: &str) -> Self {
        Self {
            name: name.to_string(),
            supports_mixed_media: true,
            supports_text_only: true,
            failure: None,
            transient_failures: 0,
        }
    }

    pub fn publish_failure(name: &str, message: &str) -> Self {
        Self {
            failure: Some(PlatformError::Publish(message.to_string())),
            ..Self::success(name)
        }
    }

    pub fn auth_failure(name: &str) -> Self {
        Self {
            failure: Some(PlatformError::Authentication("Token expired".to_string())),
            ..Self::success(name)
        }
    }

    pub fn transient_then_success(name: &str, failures: u32) -> Self {
        Self {
            transient_failures: failures,
            ..Self::success(name)
        }
    }
}

/// A record of one successful publish
#[derive(Debug, Clone)]
pub struct PublishedPost {
    pub caption: String,
    pub media_count: usize,
}

pub struct MockPlatform {
    config: MockConfig,
    attempts: Arc<AtomicU32>,
    published: Arc<Mutex<Vec<PublishedPost>>>,
}

/// Inspection handle that survives boxing the platform
#[derive(Clone)]
pub struct MockHandle {
    attempts: Arc<AtomicU32>,
    published: Arc<Mutex<Vec<PublishedPost>>>,
}

impl MockHandle {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<PublishedPost> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            attempts: Arc::new(AtomicU32::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            attempts: self.attempts.clone(),
            published: self.published.clone(),
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports_mixed_media(&self) -> bool {
        self.config.supports_mixed_media
    }

    fn supports_text_only(&self) -> bool {
        self.config.supports_text_only
    }

    async fn publish(&self, media: &[MediaItem], caption: &str) -> Result<PublishOutcome> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if attempt < self.config.transient_failures {
            return Err(PlatformError::Network("Simulated connection reset".to_string()).into());
        }
        if let Some(failure) = &self.config.failure {
            return Err(failure.clone().into());
        }

        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedPost {
                caption: caption.to_string(),
                media_count: media.len(),
            });

        Ok(PublishOutcome {
            platform_post_id: format!("{}_post_{}", self.config.name, attempt + 1),
            post_type: "mock".to_string(),
        })
    }
}

//! Shared pieces of the publish protocols
//!
//! Platforms differ in their upload choreography (direct post, container
//! plus poll, chunked resumable upload) but share two building blocks: a
//! media-shape classification that picks the protocol variant, and a
//! polling routine that drives remote processing to a terminal state.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{PlatformError, Result};
use crate::types::{MediaItem, MediaType};

/// Shape of a post's media set, which selects the upload protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    Text,
    SingleImage,
    SingleVideo,
    /// Two or more images, no videos
    ImageSet,
    /// Any combination containing a video alongside other items
    MixedSet,
}

/// Classify a media list into the protocol variant it requires
pub fn classify(media: &[MediaItem]) -> PostKind {
    let images = media
        .iter()
        .filter(|m| m.media_type == MediaType::Image)
        .count();
    let videos = media.len() - images;

    match (images, videos) {
        (0, 0) => PostKind::Text,
        (1, 0) => PostKind::SingleImage,
        (0, 1) => PostKind::SingleVideo,
        (_, 0) => PostKind::ImageSet,
        _ => PostKind::MixedSet,
    }
}

/// One observation of a remote processing job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    InProgress,
    Finished,
    Error(String),
}

/// Poll `check` every `interval` until it reports a terminal state.
///
/// A remote `Error` state and running out of `timeout` both map to a
/// permanent `Processing` failure; the caller must not restart the remote
/// job afterwards. Transport errors from `check` propagate unchanged so
/// the caller's backoff policy applies to them.
pub async fn poll_until_terminal<F, Fut>(
    label: &str,
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match check().await? {
            PollStatus::Finished => {
                debug!("{} finished processing", label);
                return Ok(());
            }
            PollStatus::Error(message) => {
                return Err(
                    PlatformError::Processing(format!("{} failed: {}", label, message)).into(),
                );
            }
            PollStatus::InProgress => {
                if Instant::now() + interval > deadline {
                    return Err(PlatformError::Processing(format!(
                        "{} did not finish within {:?}",
                        label, timeout
                    ))
                    .into());
                }
                debug!("{} still processing, polling again in {:?}", label, interval);
                sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QcastError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn item(media_type: MediaType) -> MediaItem {
        MediaItem {
            path: PathBuf::from("/staged/x"),
            source_path: PathBuf::from("/src/x"),
            media_type,
        }
    }

    #[test]
    fn test_classify_text() {
        assert_eq!(classify(&[]), PostKind::Text);
    }

    #[test]
    fn test_classify_single_items() {
        assert_eq!(classify(&[item(MediaType::Image)]), PostKind::SingleImage);
        assert_eq!(classify(&[item(MediaType::Video)]), PostKind::SingleVideo);
    }

    #[test]
    fn test_classify_image_set() {
        let media = vec![item(MediaType::Image), item(MediaType::Image)];
        assert_eq!(classify(&media), PostKind::ImageSet);
    }

    #[test]
    fn test_classify_mixed_set() {
        let media = vec![item(MediaType::Image), item(MediaType::Video)];
        assert_eq!(classify(&media), PostKind::MixedSet);

        // Multiple videos count as mixed too
        let media = vec![item(MediaType::Video), item(MediaType::Video)];
        assert_eq!(classify(&media), PostKind::MixedSet);
    }

    #[tokio::test]
    async fn test_poll_finishes() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = poll_until_terminal(
            "container",
            Duration::from_millis(1),
            Duration::from_secs(1),
            move || {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Ok(PollStatus::InProgress)
                    } else {
                        Ok(PollStatus::Finished)
                    }
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_remote_error_is_permanent_processing() {
        let result = poll_until_terminal(
            "container",
            Duration::from_millis(1),
            Duration::from_secs(1),
            || async { Ok(PollStatus::Error("codec unsupported".to_string())) },
        )
        .await;

        match result {
            Err(QcastError::Platform(PlatformError::Processing(msg))) => {
                assert!(msg.contains("codec unsupported"));
            }
            other => panic!("Expected processing error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_poll_timeout_is_permanent_processing() {
        let err = poll_until_terminal(
            "container",
            Duration::from_millis(5),
            Duration::from_millis(12),
            || async { Ok(PollStatus::InProgress) },
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            QcastError::Platform(PlatformError::Processing(_))
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_poll_propagates_transport_errors() {
        let result = poll_until_terminal(
            "container",
            Duration::from_millis(1),
            Duration::from_secs(1),
            || async { Err::<PollStatus, _>(PlatformError::Network("reset".to_string()).into()) },
        )
        .await;

        assert!(matches!(
            result,
            Err(QcastError::Platform(PlatformError::Network(_)))
        ));
    }
}

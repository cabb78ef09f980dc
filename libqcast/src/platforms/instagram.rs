//! Instagram Business adapter (Meta Graph API)
//!
//! Instagram's container workflow only accepts media by public URL, so
//! local files are first uploaded unpublished to the linked Facebook Page
//! and their CDN URLs fed into the containers. Every container that needs
//! remote processing is polled to FINISHED before `media_publish`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{PlatformError, Result};
use crate::platforms::graph::{self, parse_response, require_str, transport_error};
use crate::platforms::{file_name_of, read_media, Platform, PublishOutcome};
use crate::protocol::{classify, poll_until_terminal, PollStatus, PostKind};
use crate::retry::Backoff;
use crate::types::{MediaItem, MediaType};

const CONTAINER_POLL_INTERVAL: Duration = Duration::from_secs(5);
const CONTAINER_POLL_TIMEOUT: Duration = Duration::from_secs(300);

const CAROUSEL_MIN_ITEMS: usize = 2;
const CAROUSEL_MAX_ITEMS: usize = 10;

pub struct InstagramPlatform {
    client: reqwest::Client,
    account_id: String,
    page_id: String,
    access_token: String,
    backoff: Backoff,
}

impl InstagramPlatform {
    pub fn new(account_id: String, page_id: String, access_token: String) -> Result<Self> {
        Ok(Self {
            client: graph::build_client()?,
            account_id,
            page_id,
            access_token,
            backoff: Backoff::default(),
        })
    }

    async fn post_single_image(&self, item: &MediaItem, caption: &str) -> Result<PublishOutcome> {
        let image_url = self.host_media(item).await?;
        let container_id = self
            .create_container(&[("image_url", image_url.as_str()), ("caption", caption)])
            .await?;

        // Single-image containers are ready immediately
        let media_id = self.publish_container(&container_id).await?;
        Ok(PublishOutcome {
            platform_post_id: media_id,
            post_type: "photo".to_string(),
        })
    }

    async fn post_reel(&self, item: &MediaItem, caption: &str) -> Result<PublishOutcome> {
        let video_url = self.host_media(item).await?;
        let container_id = self
            .create_container(&[
                ("video_url", video_url.as_str()),
                ("media_type", "REELS"),
                ("caption", caption),
            ])
            .await?;

        self.poll_container(&container_id, "Reel container").await?;
        let media_id = self.publish_container(&container_id).await?;
        Ok(PublishOutcome {
            platform_post_id: media_id,
            post_type: "reel".to_string(),
        })
    }

    async fn post_carousel(&self, media: &[MediaItem], caption: &str) -> Result<PublishOutcome> {
        if media.len() < CAROUSEL_MIN_ITEMS || media.len() > CAROUSEL_MAX_ITEMS {
            return Err(PlatformError::Validation(format!(
                "Instagram carousels need {} to {} items, got {}",
                CAROUSEL_MIN_ITEMS,
                CAROUSEL_MAX_ITEMS,
                media.len()
            ))
            .into());
        }

        let mut children = Vec::with_capacity(media.len());
        for item in media {
            let hosted_url = self.host_media(item).await?;
            let child_id = match item.media_type {
                MediaType::Image => {
                    self.create_container(&[
                        ("image_url", hosted_url.as_str()),
                        ("is_carousel_item", "true"),
                    ])
                    .await?
                }
                MediaType::Video => {
                    let id = self
                        .create_container(&[
                            ("video_url", hosted_url.as_str()),
                            ("media_type", "REELS"),
                            ("is_carousel_item", "true"),
                        ])
                        .await?;
                    // Video children must finish processing before the
                    // parent container will accept them
                    self.poll_container(&id, "Carousel video container").await?;
                    id
                }
            };
            debug!("Created carousel child container {}", child_id);
            children.push(child_id);
        }

        let children_list = children.join(",");
        let container_id = self
            .create_container(&[
                ("media_type", "CAROUSEL"),
                ("children", children_list.as_str()),
                ("caption", caption),
            ])
            .await?;

        self.poll_container(&container_id, "Carousel container")
            .await?;
        let media_id = self.publish_container(&container_id).await?;
        Ok(PublishOutcome {
            platform_post_id: media_id,
            post_type: "carousel".to_string(),
        })
    }

    /// Upload a local file unpublished to the linked Facebook Page and
    /// return its CDN URL.
    async fn host_media(&self, item: &MediaItem) -> Result<String> {
        let bytes = read_media(item).await?;
        let file_name = file_name_of(item);

        match item.media_type {
            MediaType::Image => {
                let context = format!("Hosting image '{}'", item.path.display());
                let url = graph::graph_url(&format!("{}/photos", self.page_id));
                let body = self
                    .upload_unpublished(&url, &file_name, &bytes, &context)
                    .await?;
                let photo_id = require_str(&body, "id", &context)?;

                let body = self
                    .get_json(
                        &graph::graph_url(&photo_id),
                        &[("fields", "images")],
                        "Fetching hosted image URL",
                    )
                    .await?;
                // Largest rendition first
                body.get("images")
                    .and_then(|v| v.get(0))
                    .and_then(|v| v.get("source"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PlatformError::Publish(format!(
                            "No hosted URL for image '{}'",
                            item.path.display()
                        ))
                        .into()
                    })
            }
            MediaType::Video => {
                let context = format!("Hosting video '{}'", item.path.display());
                let url = graph::graph_url(&format!("{}/videos", self.page_id));
                let body = self
                    .upload_unpublished(&url, &file_name, &bytes, &context)
                    .await?;
                let video_id = require_str(&body, "id", &context)?;

                // The source URL only appears once the Page has processed
                // the upload
                let url = graph::graph_url(&video_id);
                let url = url.as_str();
                poll_until_terminal(
                    "Hosted video",
                    CONTAINER_POLL_INTERVAL,
                    CONTAINER_POLL_TIMEOUT,
                    move || async move {
                        let body = self
                            .get_json(url, &[("fields", "source")], "Fetching hosted video URL")
                            .await?;
                        if body.get("source").and_then(Value::as_str).is_some() {
                            Ok(PollStatus::Finished)
                        } else {
                            Ok(PollStatus::InProgress)
                        }
                    },
                )
                .await?;

                let body = self
                    .get_json(url, &[("fields", "source")], "Fetching hosted video URL")
                    .await?;
                require_str(&body, "source", "Fetching hosted video URL")
            }
        }
    }

    async fn upload_unpublished(
        &self,
        url: &str,
        file_name: &str,
        bytes: &[u8],
        context: &str,
    ) -> Result<Value> {
        self.backoff
            .execute(context, move || async move {
                let part = Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
                let form = Form::new()
                    .part("source", part)
                    .text("published", "false")
                    .text("access_token", self.access_token.clone());
                let response = self
                    .client
                    .post(url)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(transport_error)?;
                parse_response(response, context).await
            })
            .await
    }

    async fn create_container(&self, fields: &[(&str, &str)]) -> Result<String> {
        let url = graph::graph_url(&format!("{}/media", self.account_id));
        let url = url.as_str();
        let body = self
            .backoff
            .execute("Creating media container", move || async move {
                let mut form: Vec<(String, String)> = fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                form.push(("access_token".to_string(), self.access_token.clone()));
                let response = self
                    .client
                    .post(url)
                    .form(&form)
                    .send()
                    .await
                    .map_err(transport_error)?;
                parse_response(response, "Creating media container").await
            })
            .await?;
        require_str(&body, "id", "Creating media container")
    }

    async fn poll_container(&self, container_id: &str, label: &str) -> Result<()> {
        let url = graph::graph_url(container_id);
        let url = url.as_str();
        poll_until_terminal(
            label,
            CONTAINER_POLL_INTERVAL,
            CONTAINER_POLL_TIMEOUT,
            move || async move {
                let body = self
                    .get_json(url, &[("fields", "status_code")], "Checking container status")
                    .await?;
                Ok(container_status(&body))
            },
        )
        .await
    }

    async fn publish_container(&self, container_id: &str) -> Result<String> {
        let url = graph::graph_url(&format!("{}/media_publish", self.account_id));
        let url = url.as_str();
        info!("Publishing container {}", container_id);
        let body = self
            .backoff
            .execute("Publishing container", move || async move {
                let response = self
                    .client
                    .post(url)
                    .form(&[
                        ("creation_id", container_id),
                        ("access_token", self.access_token.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(transport_error)?;
                parse_response(response, "Publishing container").await
            })
            .await?;
        require_str(&body, "id", "Publishing container")
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)], context: &str) -> Result<Value> {
        self.backoff
            .execute(context, move || async move {
                let response = self
                    .client
                    .get(url)
                    .query(query)
                    .query(&[("access_token", self.access_token.as_str())])
                    .send()
                    .await
                    .map_err(transport_error)?;
                parse_response(response, context).await
            })
            .await
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn name(&self) -> &str {
        "instagram"
    }

    fn supports_mixed_media(&self) -> bool {
        true
    }

    async fn publish(&self, media: &[MediaItem], caption: &str) -> Result<PublishOutcome> {
        match classify(media) {
            PostKind::Text => Err(PlatformError::Validation(
                "Instagram posts need at least one media file".to_string(),
            )
            .into()),
            PostKind::SingleImage => self.post_single_image(&media[0], caption).await,
            PostKind::SingleVideo => self.post_reel(&media[0], caption).await,
            PostKind::ImageSet | PostKind::MixedSet => self.post_carousel(media, caption).await,
        }
    }
}

/// Map a container status body to a poll observation
fn container_status(body: &Value) -> PollStatus {
    match body.get("status_code").and_then(Value::as_str) {
        Some("FINISHED") => PollStatus::Finished,
        Some("ERROR") | Some("EXPIRED") => {
            let detail = body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("no detail");
            PollStatus::Error(detail.to_string())
        }
        _ => PollStatus::InProgress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn platform() -> InstagramPlatform {
        InstagramPlatform::new(
            "17890000000000000".to_string(),
            "1234567890".to_string(),
            "token".to_string(),
        )
        .unwrap()
    }

    fn image(name: &str) -> MediaItem {
        MediaItem {
            path: PathBuf::from(format!("/staged/{}", name)),
            source_path: PathBuf::from(format!("/src/{}", name)),
            media_type: MediaType::Image,
        }
    }

    #[test]
    fn test_capabilities() {
        let platform = platform();
        assert_eq!(platform.name(), "instagram");
        assert!(platform.supports_mixed_media());
        assert!(!platform.supports_text_only());
    }

    #[test]
    fn test_container_status_mapping() {
        let finished: Value = serde_json::from_str(r#"{"status_code": "FINISHED"}"#).unwrap();
        assert_eq!(container_status(&finished), PollStatus::Finished);

        let in_progress: Value = serde_json::from_str(r#"{"status_code": "IN_PROGRESS"}"#).unwrap();
        assert_eq!(container_status(&in_progress), PollStatus::InProgress);

        let missing: Value = serde_json::from_str("{}").unwrap();
        assert_eq!(container_status(&missing), PollStatus::InProgress);

        let error: Value =
            serde_json::from_str(r#"{"status_code": "ERROR", "status": "Media type unsupported"}"#)
                .unwrap();
        assert_eq!(
            container_status(&error),
            PollStatus::Error("Media type unsupported".to_string())
        );
    }

    #[tokio::test]
    async fn test_text_only_rejected() {
        let err = platform().publish(&[], "caption").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_staged_file_is_permanent() {
        let media = vec![image("missing.jpg")];

        // Fails reading the staged file; nothing is sent upstream
        let err = platform().publish(&media, "caption").await.unwrap_err();
        match err {
            crate::error::QcastError::Platform(PlatformError::Validation(msg)) => {
                assert!(msg.contains("missing.jpg"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_carousel_rejected_before_upload() {
        let media: Vec<_> = (0..11).map(|i| image(&format!("img{}.jpg", i))).collect();

        // Fails on the size check; no file is ever read
        let err = platform().publish(&media, "caption").await.unwrap_err();
        match err {
            crate::error::QcastError::Platform(PlatformError::Validation(msg)) => {
                assert!(msg.contains("2 to 10"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }
}

//! Facebook Page adapter (Meta Graph API)
//!
//! Protocol shapes:
//! - text-only and single-image posts publish in one call
//! - image sets and mixed sets upload every part unpublished, then attach
//!   them all to one feed post
//! - videos up to 100 MB upload in one multipart request; larger files go
//!   through the resumable start/transfer/finish protocol

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{PlatformError, Result};
use crate::platforms::graph::{self, parse_response, require_str, transport_error};
use crate::platforms::{file_name_of, read_media, Platform, PublishOutcome};
use crate::protocol::{classify, PostKind};
use crate::retry::Backoff;
use crate::types::{MediaItem, MediaType};

pub const RESUMABLE_UPLOAD_THRESHOLD: u64 = 100 * 1024 * 1024;

pub struct FacebookPlatform {
    client: reqwest::Client,
    page_id: String,
    access_token: String,
    backoff: Backoff,
}

impl FacebookPlatform {
    pub fn new(page_id: String, access_token: String) -> Result<Self> {
        Ok(Self {
            client: graph::build_client()?,
            page_id,
            access_token,
            backoff: Backoff::default(),
        })
    }

    async fn post_text(&self, caption: &str) -> Result<PublishOutcome> {
        let url = graph::graph_url(&format!("{}/feed", self.page_id));
        let url = url.as_str();
        let body = self
            .backoff
            .execute("Publishing text post", move || async move {
                let response = self
                    .client
                    .post(url)
                    .form(&[
                        ("message", caption),
                        ("access_token", self.access_token.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(transport_error)?;
                parse_response(response, "Publishing text post").await
            })
            .await?;

        Ok(PublishOutcome {
            platform_post_id: require_str(&body, "id", "Publishing text post")?,
            post_type: "text".to_string(),
        })
    }

    async fn post_single_image(&self, item: &MediaItem, caption: &str) -> Result<PublishOutcome> {
        let url = graph::graph_url(&format!("{}/photos", self.page_id));
        let bytes = read_media(item).await?;
        let file_name = file_name_of(item);
        let fields = vec![
            ("message".to_string(), caption.to_string()),
            ("access_token".to_string(), self.access_token.clone()),
        ];

        let body = self
            .multipart_with_retry(&url, "source", &file_name, &bytes, &fields, "Publishing single image")
            .await?;

        // Photo publishes return post_id alongside the photo's own id
        let post_id = body
            .get("post_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let post_id = match post_id {
            Some(id) => id,
            None => require_str(&body, "id", "Publishing single image")?,
        };

        Ok(PublishOutcome {
            platform_post_id: post_id,
            post_type: "single_image".to_string(),
        })
    }

    async fn post_carousel(&self, media: &[MediaItem], caption: &str) -> Result<PublishOutcome> {
        let mut media_ids = Vec::with_capacity(media.len());
        for item in media {
            media_ids.push(self.upload_image_unpublished(item).await?);
        }

        let post_id = self.attach_to_feed(&media_ids, caption).await?;
        Ok(PublishOutcome {
            platform_post_id: post_id,
            post_type: "carousel".to_string(),
        })
    }

    async fn post_single_video(&self, item: &MediaItem, caption: &str) -> Result<PublishOutcome> {
        let video_id = self.upload_video(item, true, Some(caption)).await?;
        Ok(PublishOutcome {
            platform_post_id: video_id,
            post_type: "video".to_string(),
        })
    }

    /// Images and unpublished videos attached to one feed post
    async fn post_mixed(&self, media: &[MediaItem], caption: &str) -> Result<PublishOutcome> {
        let mut media_ids = Vec::with_capacity(media.len());
        for item in media {
            let id = match item.media_type {
                MediaType::Image => self.upload_image_unpublished(item).await?,
                MediaType::Video => self.upload_video(item, false, None).await?,
            };
            media_ids.push(id);
        }

        let post_id = self.attach_to_feed(&media_ids, caption).await?;
        Ok(PublishOutcome {
            platform_post_id: post_id,
            post_type: "mixed".to_string(),
        })
    }

    async fn upload_image_unpublished(&self, item: &MediaItem) -> Result<String> {
        let url = graph::graph_url(&format!("{}/photos", self.page_id));
        let bytes = read_media(item).await?;
        let file_name = file_name_of(item);
        let context = format!("Uploading image '{}'", item.path.display());
        let fields = vec![
            ("published".to_string(), "false".to_string()),
            ("access_token".to_string(), self.access_token.clone()),
        ];

        let body = self
            .multipart_with_retry(&url, "source", &file_name, &bytes, &fields, &context)
            .await?;
        require_str(&body, "id", &context)
    }

    async fn upload_video(
        &self,
        item: &MediaItem,
        published: bool,
        description: Option<&str>,
    ) -> Result<String> {
        let bytes = read_media(item).await?;
        if bytes.len() as u64 > RESUMABLE_UPLOAD_THRESHOLD {
            self.upload_video_resumable(item, &bytes, published, description)
                .await
        } else {
            self.upload_video_simple(item, &bytes, published, description)
                .await
        }
    }

    async fn upload_video_simple(
        &self,
        item: &MediaItem,
        bytes: &[u8],
        published: bool,
        description: Option<&str>,
    ) -> Result<String> {
        let url = graph::graph_url(&format!("{}/videos", self.page_id));
        let file_name = file_name_of(item);
        let context = format!("Uploading video '{}'", item.path.display());

        let mut fields = vec![
            ("access_token".to_string(), self.access_token.clone()),
            ("published".to_string(), published.to_string()),
        ];
        if let Some(description) = description {
            fields.push(("description".to_string(), description.to_string()));
        }

        let body = self
            .multipart_with_retry(&url, "source", &file_name, bytes, &fields, &context)
            .await?;
        require_str(&body, "id", &context)
    }

    /// Resumable upload for large videos: start, transfer chunks at the
    /// offsets the server dictates, finish.
    async fn upload_video_resumable(
        &self,
        item: &MediaItem,
        bytes: &[u8],
        published: bool,
        description: Option<&str>,
    ) -> Result<String> {
        let url = graph::graph_url(&format!("{}/videos", self.page_id));
        let file_name = file_name_of(item);
        let file_size = bytes.len() as u64;
        info!(
            "Starting resumable upload for {} ({} bytes)",
            item.path.display(),
            file_size
        );

        let url = url.as_str();
        let start_body = self
            .backoff
            .execute("Resumable upload start", move || async move {
                let form = vec![
                    ("access_token".to_string(), self.access_token.clone()),
                    ("upload_phase".to_string(), "start".to_string()),
                    ("file_size".to_string(), file_size.to_string()),
                ];
                let response = self
                    .client
                    .post(url)
                    .form(&form)
                    .send()
                    .await
                    .map_err(transport_error)?;
                parse_response(response, "Resumable upload start").await
            })
            .await?;

        let session_id = require_str(&start_body, "upload_session_id", "Resumable upload start")?;
        let mut start_offset = offset_field(&start_body, "start_offset", 0);
        let mut end_offset = offset_field(&start_body, "end_offset", file_size);

        while start_offset < file_size {
            let (chunk_start, chunk_end) = chunk_bounds(start_offset, end_offset, file_size)?;
            let chunk = &bytes[chunk_start..chunk_end];
            debug!(
                "Transferring bytes {}..{} of {}",
                start_offset, end_offset, file_size
            );

            let fields = vec![
                ("access_token".to_string(), self.access_token.clone()),
                ("upload_phase".to_string(), "transfer".to_string()),
                ("upload_session_id".to_string(), session_id.clone()),
                ("start_offset".to_string(), start_offset.to_string()),
            ];
            let transfer_body = self
                .multipart_with_retry(
                    url,
                    "video_file_chunk",
                    &file_name,
                    chunk,
                    &fields,
                    "Resumable upload transfer",
                )
                .await?;

            start_offset = offset_field(&transfer_body, "start_offset", file_size);
            end_offset = offset_field(&transfer_body, "end_offset", file_size);
        }

        let session_ref = session_id.as_str();
        let finish_body = self
            .backoff
            .execute("Resumable upload finish", move || async move {
                let mut form = vec![
                    ("access_token".to_string(), self.access_token.clone()),
                    ("upload_phase".to_string(), "finish".to_string()),
                    ("upload_session_id".to_string(), session_ref.to_string()),
                    ("published".to_string(), published.to_string()),
                ];
                if let Some(description) = description {
                    form.push(("description".to_string(), description.to_string()));
                }
                let response = self
                    .client
                    .post(url)
                    .form(&form)
                    .send()
                    .await
                    .map_err(transport_error)?;
                parse_response(response, "Resumable upload finish").await
            })
            .await?;

        require_str(&finish_body, "id", "Resumable upload finish")
    }

    async fn attach_to_feed(&self, media_ids: &[String], caption: &str) -> Result<String> {
        let url = graph::graph_url(&format!("{}/feed", self.page_id));
        let fields = feed_attachment_fields(media_ids, caption, &self.access_token);
        let url = url.as_str();
        let fields = &fields;

        let body = self
            .backoff
            .execute("Publishing feed post", move || async move {
                let response = self
                    .client
                    .post(url)
                    .form(fields)
                    .send()
                    .await
                    .map_err(transport_error)?;
                parse_response(response, "Publishing feed post").await
            })
            .await?;
        require_str(&body, "id", "Publishing feed post")
    }

    /// One multipart POST with the file under `part_name`, retried with
    /// a fresh form per attempt.
    async fn multipart_with_retry(
        &self,
        url: &str,
        part_name: &'static str,
        file_name: &str,
        bytes: &[u8],
        fields: &[(String, String)],
        context: &str,
    ) -> Result<Value> {
        self.backoff
            .execute(context, move || async move {
                let part = Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
                let mut form = Form::new().part(part_name, part);
                for (key, value) in fields {
                    form = form.text(key.clone(), value.clone());
                }
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
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn name(&self) -> &str {
        "facebook"
    }

    fn supports_mixed_media(&self) -> bool {
        true
    }

    fn supports_text_only(&self) -> bool {
        true
    }

    async fn publish(&self, media: &[MediaItem], caption: &str) -> Result<PublishOutcome> {
        match classify(media) {
            PostKind::Text => self.post_text(caption).await,
            PostKind::SingleImage => self.post_single_image(&media[0], caption).await,
            PostKind::SingleVideo => self.post_single_video(&media[0], caption).await,
            PostKind::ImageSet => self.post_carousel(media, caption).await,
            PostKind::MixedSet => self.post_mixed(media, caption).await,
        }
    }
}

/// Form fields for a feed post with attached media
fn feed_attachment_fields(
    media_ids: &[String],
    caption: &str,
    access_token: &str,
) -> Vec<(String, String)> {
    let mut fields = vec![
        ("message".to_string(), caption.to_string()),
        ("access_token".to_string(), access_token.to_string()),
    ];
    for (idx, media_id) in media_ids.iter().enumerate() {
        fields.push((
            format!("attached_media[{}]", idx),
            serde_json::json!({ "media_fbid": media_id }).to_string(),
        ));
    }
    fields
}

/// Byte range for the next transfer chunk. The server dictates offsets;
/// values that do not advance through the file are a protocol error.
fn chunk_bounds(start_offset: u64, end_offset: u64, file_size: u64) -> Result<(usize, usize)> {
    let end = end_offset.min(file_size);
    if start_offset >= end {
        return Err(PlatformError::Publish(format!(
            "Resumable upload transfer: server returned invalid offsets {}..{} for {} bytes",
            start_offset, end_offset, file_size
        ))
        .into());
    }
    Ok((start_offset as usize, end as usize))
}

fn offset_field(body: &Value, key: &str, default: u64) -> u64 {
    // Graph returns offsets as strings
    body.get(key)
        .and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let platform =
            FacebookPlatform::new("123".to_string(), "token".to_string()).unwrap();
        assert_eq!(platform.name(), "facebook");
        assert!(platform.supports_mixed_media());
        assert!(platform.supports_text_only());
    }

    #[test]
    fn test_feed_attachment_fields() {
        let ids = vec!["111".to_string(), "222".to_string()];
        let fields = feed_attachment_fields(&ids, "Gallery", "tok");

        assert_eq!(fields[0], ("message".to_string(), "Gallery".to_string()));
        assert_eq!(fields[2].0, "attached_media[0]");
        assert_eq!(fields[2].1, r#"{"media_fbid":"111"}"#);
        assert_eq!(fields[3].0, "attached_media[1]");
        assert_eq!(fields[3].1, r#"{"media_fbid":"222"}"#);
    }

    #[test]
    fn test_offset_field_accepts_strings_and_numbers() {
        let body: Value =
            serde_json::from_str(r#"{"start_offset": "1048576", "end_offset": 2097152}"#).unwrap();
        assert_eq!(offset_field(&body, "start_offset", 0), 1048576);
        assert_eq!(offset_field(&body, "end_offset", 0), 2097152);
        assert_eq!(offset_field(&body, "missing", 7), 7);
    }

    #[test]
    fn test_chunk_bounds_follows_server_offsets() {
        assert_eq!(chunk_bounds(0, 1024, 4096).unwrap(), (0, 1024));
        assert_eq!(chunk_bounds(1024, 4096, 4096).unwrap(), (1024, 4096));
        // End offset past the file is clamped to the file size
        assert_eq!(chunk_bounds(1024, 9999, 4096).unwrap(), (1024, 4096));
    }

    #[test]
    fn test_chunk_bounds_rejects_non_advancing_offsets() {
        let err = chunk_bounds(2048, 1024, 4096).unwrap_err();
        assert!(!err.is_transient());
        assert!(chunk_bounds(1024, 1024, 4096).is_err());
    }

    #[tokio::test]
    async fn test_publish_missing_staged_file_is_permanent() {
        let platform =
            FacebookPlatform::new("123".to_string(), "token".to_string()).unwrap();
        let media = vec![MediaItem {
            path: std::path::PathBuf::from("/nonexistent/photo.jpg"),
            source_path: std::path::PathBuf::from("/nonexistent/photo.jpg"),
            media_type: MediaType::Image,
        }];

        let err = platform.publish(&media, "caption").await.unwrap_err();
        assert!(!err.is_transient());
    }
}

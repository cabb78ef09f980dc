//! TikTok adapter (Content Posting API v2)
//!
//! Videos go through init, chunked upload, then a status poll until the
//! post is live. Photo posts can only be pulled from public URLs; this
//! pipeline stages local files, so photo posts fail validation unless the
//! queue entry already carries URLs. Mixed sets and multi-video sets are
//! rejected locally before any network traffic.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{PlatformError, QcastError, Result};
use crate::platforms::{read_media, truncate_body, Platform, PublishOutcome};
use crate::protocol::{classify, poll_until_terminal, PollStatus, PostKind};
use crate::retry::Backoff;
use crate::types::MediaItem;

const API_BASE: &str = "https://open.tiktokapis.com/v2";

const CHUNK_SIZE: u64 = 10 * 1024 * 1024;

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);
const STATUS_POLL_TIMEOUT: Duration = Duration::from_secs(600);

pub struct TiktokPlatform {
    client: reqwest::Client,
    access_token: String,
    privacy_level: String,
    backoff: Backoff,
}

impl TiktokPlatform {
    pub fn new(access_token: String, privacy_level: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| {
                PlatformError::Network(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            access_token,
            privacy_level,
            backoff: Backoff::default(),
        })
    }

    async fn post_video(&self, item: &MediaItem, caption: &str) -> Result<PublishOutcome> {
        let bytes = read_media(item).await?;
        let video_size = bytes.len() as u64;
        if video_size == 0 {
            return Err(PlatformError::Validation(format!(
                "Video file is empty: {}",
                item.path.display()
            ))
            .into());
        }
        let total_chunks = (video_size / CHUNK_SIZE).max(1);

        let init_body = json!({
            "post_info": {
                "title": caption,
                "privacy_level": self.privacy_level,
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": video_size,
                "chunk_size": CHUNK_SIZE,
                "total_chunk_count": total_chunks,
            },
        });
        let body = self
            .post_json("/post/publish/video/init/", &init_body, "Video init")
            .await?;

        let publish_id = require_data_str(&body, "publish_id", "Video init")?;
        let upload_url = require_data_str(&body, "upload_url", "Video init")?;
        info!(
            "TikTok upload session {} ({} bytes, {} chunk(s))",
            publish_id, video_size, total_chunks
        );

        for chunk_index in 0..total_chunks {
            let start = chunk_index * CHUNK_SIZE;
            // The final chunk absorbs the remainder
            let end = if chunk_index == total_chunks - 1 {
                video_size
            } else {
                (chunk_index + 1) * CHUNK_SIZE
            };
            self.upload_chunk(&upload_url, &bytes[start as usize..end as usize], start, video_size)
                .await?;
        }

        self.poll_publish_status(&publish_id).await?;
        Ok(PublishOutcome {
            platform_post_id: publish_id,
            post_type: "video".to_string(),
        })
    }

    async fn post_photos(&self, media: &[MediaItem], caption: &str) -> Result<PublishOutcome> {
        let mut photo_urls = Vec::with_capacity(media.len());
        for item in media {
            let path = item.path.to_string_lossy();
            if !path.starts_with("http://") && !path.starts_with("https://") {
                return Err(PlatformError::Validation(format!(
                    "TikTok photo posts need public URLs; '{}' is a local file",
                    item.path.display()
                ))
                .into());
            }
            photo_urls.push(path.to_string());
        }

        let init_body = json!({
            "post_info": {
                "title": caption,
                "privacy_level": self.privacy_level,
            },
            "source_info": {
                "source": "PULL",
                "photo_cover_index": 0,
                "photo_images": photo_urls,
            },
            "post_mode": "DIRECT_POST",
            "media_type": "PHOTO",
        });
        let body = self
            .post_json("/post/publish/content/init/", &init_body, "Photo init")
            .await?;

        let publish_id = require_data_str(&body, "publish_id", "Photo init")?;
        self.poll_publish_status(&publish_id).await?;
        Ok(PublishOutcome {
            platform_post_id: publish_id,
            post_type: "photos".to_string(),
        })
    }

    async fn upload_chunk(
        &self,
        upload_url: &str,
        chunk: &[u8],
        start: u64,
        total: u64,
    ) -> Result<()> {
        let range = format!("bytes {}-{}/{}", start, start + chunk.len() as u64 - 1, total);
        debug!("Uploading chunk {}", range);
        let range = range.as_str();

        self.backoff
            .execute("Chunk upload", move || async move {
                let response = self
                    .client
                    .put(upload_url)
                    .header("Content-Range", range)
                    .header("Content-Type", "video/mp4")
                    .body(chunk.to_vec())
                    .send()
                    .await
                    .map_err(transport_error)?;

                let status = response.status();
                // 206 acknowledges a mid-stream chunk
                if status == StatusCode::OK
                    || status == StatusCode::CREATED
                    || status == StatusCode::PARTIAL_CONTENT
                {
                    return Ok(());
                }
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(
                        PlatformError::RateLimit("Chunk upload: HTTP 429".to_string()).into()
                    );
                }
                if status.is_server_error() {
                    return Err(PlatformError::Network(format!(
                        "Chunk upload: HTTP {}",
                        status
                    ))
                    .into());
                }
                Err(PlatformError::Publish(format!("Chunk upload: HTTP {}", status)).into())
            })
            .await
    }

    async fn poll_publish_status(&self, publish_id: &str) -> Result<()> {
        poll_until_terminal(
            "TikTok publish",
            STATUS_POLL_INTERVAL,
            STATUS_POLL_TIMEOUT,
            move || async move {
                let body = self
                    .post_json(
                        "/post/publish/status/fetch/",
                        &json!({ "publish_id": publish_id }),
                        "Status fetch",
                    )
                    .await?;
                Ok(publish_status(&body))
            },
        )
        .await
    }

    async fn post_json(&self, path: &str, body: &Value, context: &str) -> Result<Value> {
        let url = format!("{}{}", API_BASE, path);
        let url = url.as_str();
        self.backoff
            .execute(context, move || async move {
                let response = self
                    .client
                    .post(url)
                    .bearer_auth(&self.access_token)
                    .json(body)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let status = response.status();
                let text = response.text().await.map_err(transport_error)?;
                interpret_body(status, &text, context)
            })
            .await
    }
}

#[async_trait]
impl Platform for TiktokPlatform {
    fn name(&self) -> &str {
        "tiktok"
    }

    fn supports_mixed_media(&self) -> bool {
        false
    }

    async fn publish(&self, media: &[MediaItem], caption: &str) -> Result<PublishOutcome> {
        match classify(media) {
            PostKind::Text => Err(PlatformError::Validation(
                "TikTok posts need at least one media file".to_string(),
            )
            .into()),
            PostKind::SingleVideo => self.post_video(&media[0], caption).await,
            PostKind::SingleImage | PostKind::ImageSet => self.post_photos(media, caption).await,
            PostKind::MixedSet => Err(PlatformError::Validation(
                "TikTok allows one video per post and no mixing of images and videos".to_string(),
            )
            .into()),
        }
    }
}

fn transport_error(e: reqwest::Error) -> QcastError {
    PlatformError::Network(e.to_string()).into()
}

/// Interpret a TikTok API response body.
///
/// Every endpoint wraps its payload as `{"data": ..., "error": {"code":
/// "ok", ...}}`; any code other than "ok" is a failure.
fn interpret_body(status: StatusCode, text: &str, context: &str) -> Result<Value> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PlatformError::RateLimit(format!("{}: HTTP 429", context)).into());
    }

    let body: Value = match serde_json::from_str(text) {
        Ok(body) => body,
        Err(_) => {
            if status.is_server_error() {
                return Err(PlatformError::Network(format!(
                    "{}: HTTP {} with non-JSON body",
                    context, status
                ))
                .into());
            }
            return Err(PlatformError::Publish(format!(
                "{}: non-JSON response: {}",
                context,
                truncate_body(text, 500)
            ))
            .into());
        }
    };

    let code = body
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .unwrap_or("ok");
    if code != "ok" {
        let message = body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown API error");

        if code.contains("rate_limit") {
            return Err(PlatformError::RateLimit(format!(
                "{}: {} ({})",
                context, message, code
            ))
            .into());
        }
        if code.contains("access_token") || code.contains("scope") {
            return Err(PlatformError::Authentication(format!(
                "{}: {} ({})",
                context, message, code
            ))
            .into());
        }
        return Err(PlatformError::Publish(format!(
            "{}: {} ({})",
            context, message, code
        ))
        .into());
    }

    Ok(body)
}

fn require_data_str(body: &Value, key: &str, context: &str) -> Result<String> {
    body.get("data")
        .and_then(|d| d.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            PlatformError::Publish(format!("{}: no '{}' in response", context, key)).into()
        })
}

/// Map a status-fetch body to a poll observation
fn publish_status(body: &Value) -> PollStatus {
    let status = body
        .get("data")
        .and_then(|d| d.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("");
    if status == "PUBLISH_COMPLETE" {
        return PollStatus::Finished;
    }
    if status.starts_with("FAILED") || status == "PUBLISH_FAILED" {
        let reason = body
            .get("data")
            .and_then(|d| d.get("fail_reason"))
            .and_then(Value::as_str)
            .unwrap_or("no fail_reason");
        return PollStatus::Error(reason.to_string());
    }
    PollStatus::InProgress
}

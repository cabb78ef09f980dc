//! Media staging
//!
//! Sources are copied into an immutable per-post directory before the post
//! is appended to the queue; the run loop only ever reads staged copies, so
//! the original files can move or disappear without breaking a scheduled
//! post.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{QcastError, Result, StoreError};
use crate::types::{MediaItem, MediaType};

/// Copy `files` into `<staged_root>/<post_id>/`.
///
/// Filename collisions get numeric suffixes ("photo.jpg", "photo_1.jpg").
/// Fails before copying anything if a file is missing or has an
/// unsupported extension.
pub fn stage_media(files: &[PathBuf], post_id: &str, staged_root: &Path) -> Result<Vec<MediaItem>> {
    let mut classified = Vec::with_capacity(files.len());
    for file in files {
        if !file.is_file() {
            return Err(QcastError::InvalidInput(format!(
                "Media file not found: {}",
                file.display()
            )));
        }
        let media_type = MediaType::from_path(file).ok_or_else(|| {
            QcastError::InvalidInput(format!("Unsupported media file: {}", file.display()))
        })?;
        classified.push((file, media_type));
    }

    let post_dir = staged_root.join(post_id);
    std::fs::create_dir_all(&post_dir).map_err(StoreError::Staging)?;

    let mut items = Vec::with_capacity(classified.len());
    for (source, media_type) in classified {
        let target = unique_target(&post_dir, source)?;
        std::fs::copy(source, &target).map_err(StoreError::Staging)?;
        debug!("Staged {} -> {}", source.display(), target.display());
        items.push(MediaItem {
            path: target,
            source_path: source.clone(),
            media_type,
        });
    }
    Ok(items)
}

/// Delete a post's staging directory. Missing directory is fine.
pub fn remove_staged(post_id: &str, staged_root: &Path) -> Result<()> {
    let post_dir = staged_root.join(post_id);
    match std::fs::remove_dir_all(&post_dir) {
        Ok(()) => {
            debug!("Removed staged media {}", post_dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Staging(e).into()),
    }
}

fn unique_target(post_dir: &Path, source: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            QcastError::InvalidInput(format!("Invalid media file name: {}", source.display()))
        })?;

    let candidate = post_dir.join(file_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("media");
    let ext = source.extension().and_then(|e| e.to_str());

    for counter in 1.. {
        let name = match ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = post_dir.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    unreachable!()
}

//! Media validation against per-platform constraints
//!
//! Checks run before staging: extension, byte size, and (when a probe is
//! available) image dimensions and video duration. A missing probe
//! downgrades the measured checks to warnings rather than failing files
//! that might be fine.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::types::MediaType;

#[derive(Debug, Clone, Copy)]
pub struct ImageConstraints {
    pub extensions: &'static [&'static str],
    pub max_size_bytes: u64,
    pub min_width: u32,
    pub min_height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct VideoConstraints {
    pub extensions: &'static [&'static str],
    pub max_size_bytes: u64,
    pub max_duration_seconds: u32,
}

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

pub fn image_constraints(platform: &str) -> Option<ImageConstraints> {
    match platform {
        "facebook" => Some(ImageConstraints {
            extensions: &["jpg", "jpeg", "png"],
            max_size_bytes: 10 * MIB,
            min_width: 100,
            min_height: 100,
        }),
        "instagram" => Some(ImageConstraints {
            extensions: &["jpg", "jpeg", "png"],
            max_size_bytes: 8 * MIB,
            min_width: 320,
            min_height: 320,
        }),
        "tiktok" => Some(ImageConstraints {
            extensions: &["jpg", "jpeg", "png", "webp"],
            max_size_bytes: 20 * MIB,
            min_width: 360,
            min_height: 360,
        }),
        _ => None,
    }
}

pub fn video_constraints(platform: &str) -> Option<VideoConstraints> {
    match platform {
        "facebook" => Some(VideoConstraints {
            extensions: &["mp4", "mov"],
            max_size_bytes: 10 * GIB,
            max_duration_seconds: 240 * 60,
        }),
        "instagram" => Some(VideoConstraints {
            extensions: &["mp4", "mov"],
            max_size_bytes: GIB,
            max_duration_seconds: 15 * 60,
        }),
        "tiktok" => Some(VideoConstraints {
            extensions: &["mp4", "mov", "webm"],
            max_size_bytes: 4 * GIB,
            max_duration_seconds: 10 * 60,
        }),
        _ => None,
    }
}

/// Measures media properties the validator cannot read from metadata alone
pub trait MediaProbe {
    /// (width, height), or None if this probe cannot measure the file
    fn image_dimensions(&self, path: &Path) -> Option<(u32, u32)>;
    /// Duration in seconds, or None if this probe cannot measure the file
    fn video_duration_seconds(&self, path: &Path) -> Option<f64>;
}

/// Probe that measures nothing; dimension and duration checks become
/// warnings instead of failures.
pub struct NoProbe;

impl MediaProbe for NoProbe {
    fn image_dimensions(&self, _path: &Path) -> Option<(u32, u32)> {
        None
    }

    fn video_duration_seconds(&self, _path: &Path) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub media_type: Option<MediaType>,
    pub size_bytes: u64,
    /// Fatal problems; any entry makes the file invalid
    pub issues: Vec<String>,
    /// Non-fatal observations (unmeasurable dimensions, etc.)
    pub warnings: Vec<String>,
}

impl FileReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub files: Vec<FileReport>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.files.iter().all(FileReport::is_valid)
    }

    pub fn issues(&self) -> impl Iterator<Item = &String> {
        self.files.iter().flat_map(|f| f.issues.iter())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &String> {
        self.files.iter().flat_map(|f| f.warnings.iter())
    }
}

/// Validate each file against each target platform
pub fn validate_files(
    files: &[PathBuf],
    platforms: &[String],
    probe: &dyn MediaProbe,
) -> ValidationReport {
    let files = files
        .iter()
        .map(|file| validate_file(file, platforms, probe))
        .collect();
    ValidationReport { files }
}

fn validate_file(file: &Path, platforms: &[String], probe: &dyn MediaProbe) -> FileReport {
    let mut report = FileReport {
        file: file.to_path_buf(),
        media_type: None,
        size_bytes: 0,
        issues: Vec::new(),
        warnings: Vec::new(),
    };

    let metadata = match std::fs::metadata(file) {
        Ok(m) if m.is_file() => m,
        _ => {
            report
                .issues
                .push(format!("File does not exist: {}", file.display()));
            return report;
        }
    };
    report.size_bytes = metadata.len();

    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let media_type = match MediaType::from_extension(&ext) {
        Some(t) => t,
        None => {
            report.issues.push(format!(
                "Unsupported file extension '{}': {}",
                ext,
                file.display()
            ));
            return report;
        }
    };
    report.media_type = Some(media_type);

    for platform in platforms {
        match media_type {
            MediaType::Image => check_image(file, &ext, metadata.len(), platform, probe, &mut report),
            MediaType::Video => check_video(file, &ext, metadata.len(), platform, probe, &mut report),
        }
    }
    report
}

fn check_image(
    file: &Path,
    ext: &str,
    size: u64,
    platform: &str,
    probe: &dyn MediaProbe,
    report: &mut FileReport,
) {
    let reqs = match image_constraints(platform) {
        Some(reqs) => reqs,
        None => {
            report
                .warnings
                .push(format!("[{}] No image constraints known", platform));
            return;
        }
    };

    if !reqs.extensions.contains(&ext) {
        report.issues.push(format!(
            "[{}] Extension '{}' not supported. Allowed: {}",
            platform,
            ext,
            reqs.extensions.join(", ")
        ));
    }

    if size > reqs.max_size_bytes {
        report.issues.push(format!(
            "[{}] File size ({}) exceeds maximum ({})",
            platform,
            fmt_bytes(size),
            fmt_bytes(reqs.max_size_bytes)
        ));
    }

    match probe.image_dimensions(file) {
        Some((width, height)) => {
            if width < reqs.min_width || height < reqs.min_height {
                report.issues.push(format!(
                    "[{}] Image dimensions {}x{} below minimum {}x{}",
                    platform, width, height, reqs.min_width, reqs.min_height
                ));
            }
        }
        None => {
            report.warnings.push(format!(
                "[{}] Could not measure image dimensions, skipping check",
                platform
            ));
        }
    }
}

fn check_video(
    file: &Path,
    ext: &str,
    size: u64,
    platform: &str,
    probe: &dyn MediaProbe,
    report: &mut FileReport,
) {
    let reqs = match video_constraints(platform) {
        Some(reqs) => reqs,
        None => {
            report
                .warnings
                .push(format!("[{}] No video constraints known", platform));
            return;
        }
    };

    if !reqs.extensions.contains(&ext) {
        report.issues.push(format!(
            "[{}] Extension '{}' not supported. Allowed: {}",
            platform,
            ext,
            reqs.extensions.join(", ")
        ));
    }

    if size > reqs.max_size_bytes {
        report.issues.push(format!(
            "[{}] File size ({}) exceeds maximum ({})",
            platform,
            fmt_bytes(size),
            fmt_bytes(reqs.max_size_bytes)
        ));
    }

    match probe.video_duration_seconds(file) {
        Some(duration) => {
            if duration > reqs.max_duration_seconds as f64 {
                report.issues.push(format!(
                    "[{}] Video duration ({:.1} min) exceeds maximum ({:.1} min)",
                    platform,
                    duration / 60.0,
                    reqs.max_duration_seconds as f64 / 60.0
                ));
            }
        }
        None => {
            report.warnings.push(format!(
                "[{}] Could not measure video duration, skipping check",
                platform
            ));
        }
    }
}

fn fmt_bytes(num: u64) -> String {
    if num >= GIB {
        format!("{:.1} GB", num as f64 / GIB as f64)
    } else if num >= MIB {
        format!("{:.1} MB", num as f64 / MIB as f64)
    } else if num >= 1024 {
        format!("{:.1} KB", num as f64 / 1024.0)
    } else {
        format!("{} B", num)
    }
}

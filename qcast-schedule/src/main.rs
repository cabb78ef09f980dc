//! qcast-schedule - queue a social media post for future publishing

use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use libqcast::logging;
use libqcast::scheduling;
use libqcast::staging;
use libqcast::validation::{validate_files, NoProbe};
use libqcast::{Config, Post, QcastError, QueueStore, Result};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "qcast-schedule")]
#[command(about = "Schedule a post for future publishing", long_about = None)]
struct Cli {
    /// Media files in presentation order (repeatable)
    #[arg(short, long)]
    media: Vec<PathBuf>,

    /// Post caption
    #[arg(short, long, default_value = "")]
    caption: String,

    /// Target platforms, comma-separated (facebook,instagram,tiktok)
    #[arg(short, long)]
    platforms: String,

    /// When to post: "2026-09-01 15:00", "2h", or "tomorrow 3pm"
    #[arg(short, long)]
    schedule: String,

    /// IANA timezone recorded with the post
    #[arg(short, long, default_value = "UTC")]
    timezone: String,

    /// Config file path
    #[arg(long, env = "QCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_cli(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let platforms: Vec<String> = cli
        .platforms
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if platforms.is_empty() {
        return Err(QcastError::InvalidInput(
            "At least one target platform is required".to_string(),
        ));
    }
    if cli.caption.is_empty() && cli.media.is_empty() {
        return Err(QcastError::InvalidInput(
            "A post needs a caption, media, or both".to_string(),
        ));
    }

    let scheduled_at = scheduling::parse_schedule(&cli.schedule)?;
    scheduling::ensure_future(scheduled_at, Utc::now())?;

    let report = validate_files(&cli.media, &platforms, &NoProbe);
    for warning in report.warnings() {
        warn!("{}", warning);
    }
    if !report.is_valid() {
        let issues: Vec<&str> = report.issues().map(String::as_str).collect();
        return Err(QcastError::InvalidInput(format!(
            "Media validation failed:\n  {}",
            issues.join("\n  ")
        )));
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let mut post = Post::new(
        cli.caption,
        platforms,
        Vec::new(),
        scheduled_at,
        cli.timezone,
    );
    post.media = staging::stage_media(&cli.media, &post.id, &config.staged_root())?;

    let store = QueueStore::new(config.queue_path());
    store.append(post.clone()).await?;

    let summary = serde_json::json!({
        "id": post.id,
        "status": post.status.to_string(),
        "scheduled_at": post.scheduled_at.to_rfc3339(),
        "timezone": post.timezone,
        "platforms": post.platforms,
        "media": post.media.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary).map_err(|e| {
        QcastError::Store(libqcast::error::StoreError::ParseError(e))
    })?);
    Ok(())
}

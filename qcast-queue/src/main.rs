//! qcast-queue - inspect and drive the scheduling queue
//!
//! `run` is the cron entrypoint: it publishes every due post and exits
//! quietly when another run already holds the lock.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use libqcast::logging;
use libqcast::platforms::create_platforms;
use libqcast::{Config, Post, PostStatus, QcastError, Result, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "qcast-queue")]
#[command(about = "Inspect and drive the post scheduling queue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file path
    #[arg(long, env = "QCAST_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish every post whose scheduled time has arrived
    Run,
    /// List queued posts
    List {
        /// Only show posts with this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Cancel a pending post and delete its staged media
    Cancel {
        /// Post ID (post_...)
        post_id: String,
    },
    /// Remove old terminal posts and their staged media
    Cleanup,
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
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let json_output = match cli.format.as_str() {
        "json" => true,
        "text" => false,
        other => {
            return Err(QcastError::InvalidInput(format!(
                "Invalid output format: '{}'. Valid options: text, json",
                other
            )))
        }
    };

    let scheduler = Scheduler::new(
        config.queue_path(),
        config.lock_path(),
        config.staged_root(),
    );

    match cli.command {
        Command::Run => {
            let platforms = create_platforms(&config)?;
            let report = scheduler.run(&platforms, Utc::now()).await?;
            if json_output {
                println!("{}", to_json(&report)?);
            } else if !report.ran {
                println!("Skipped: another run is in progress");
            } else {
                println!(
                    "Due: {}  completed: {}  partial: {}  failed: {}",
                    report.due,
                    report.completed.len(),
                    report.partial.len(),
                    report.failed.len()
                );
            }
        }
        Command::List { status } => {
            let filter = status.as_deref().map(parse_status).transpose()?;
            let queue = scheduler.store().load()?;
            let posts: Vec<&Post> = queue
                .posts
                .iter()
                .filter(|p| filter.map(|s| p.status == s).unwrap_or(true))
                .collect();

            if json_output {
                println!("{}", to_json(&posts)?);
            } else if posts.is_empty() {
                println!("Queue is empty");
            } else {
                print_table(&posts);
            }
        }
        Command::Cancel { post_id } => {
            let post = scheduler.cancel(&post_id).await?;
            if json_output {
                println!("{}", to_json(&post)?);
            } else {
                println!("Cancelled {}", post.id);
            }
        }
        Command::Cleanup => {
            let report = scheduler.cleanup(Utc::now()).await?;
            if json_output {
                println!("{}", to_json(&report)?);
            } else {
                println!("Removed {} post(s)", report.removed.len());
            }
        }
    }
    Ok(())
}

fn parse_status(input: &str) -> Result<PostStatus> {
    serde_json::from_value(serde_json::Value::String(input.to_lowercase())).map_err(|_| {
        QcastError::InvalidInput(format!(
            "Unknown status '{}'. Valid: pending, posting, completed, failed, partial, cancelled",
            input
        ))
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| QcastError::Store(libqcast::error::StoreError::ParseError(e)))
}

fn print_table(posts: &[&Post]) {
    println!(
        "{:<18} {:<10} {:<17} {:<28} CAPTION",
        "ID", "STATUS", "SCHEDULED (UTC)", "PLATFORMS"
    );
    for post in posts {
        let mut caption: String = post.caption.chars().take(40).collect();
        if post.caption.chars().count() > 40 {
            caption.push_str("...");
        }
        println!(
            "{:<18} {:<10} {:<17} {:<28} {}",
            post.id,
            post.status.to_string(),
            post.scheduled_at.format("%Y-%m-%d %H:%M"),
            post.platforms.join(","),
            caption
        );
    }
}

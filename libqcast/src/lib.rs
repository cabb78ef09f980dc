//! qcast - scheduled publishing for social media pages
//!
//! This library provides the durable scheduling queue and the per-platform
//! publish protocols behind the qcast command-line tools.

pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod platforms;
pub mod protocol;
pub mod retry;
pub mod runner;
pub mod scheduling;
pub mod staging;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use error::{QcastError, Result};
pub use runner::{CleanupReport, RunReport, Scheduler};
pub use store::QueueStore;
pub use types::{MediaItem, MediaType, Post, PostStatus, Queue};

//! # modelhub-dl
//!
//! Backend library for downloading AI model artifacts and their preview
//! media from a model-hosting service into a local tree laid out for a
//! downstream inference application.
//!
//! ## Design Philosophy
//!
//! modelhub-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Cooperatively cancellable** - Every job carries a token checked at
//!   each suspension point; nothing is ever force-killed
//!
//! ## Quick Start
//!
//! ```no_run
//! use modelhub_dl::{Config, ModelDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         comfy_path: "/data/comfyui/models".into(),
//!         api_key: "token".into(),
//!         ..Default::default()
//!     };
//!
//!     let downloader = ModelDownloader::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Queue a model page and run it
//!     downloader.add("https://civitai.com/models/12345");
//!     let _started = downloader.start_next(None);
//!     downloader.wait_idle().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Bandwidth monitoring with a sliding sample window
pub mod bandwidth;
/// Remote model-hosting service client
pub mod client;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Static gallery emitter
pub mod gallery;
/// Storage layout, scanning, and maintenance
pub mod storage;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use bandwidth::{BandwidthMonitor, BandwidthSample};
pub use client::{HubClient, ModelHost, parse_model_url};
pub use config::Config;
pub use downloader::{ModelDownloader, TaskPatch};
pub use error::{Error, Result};
pub use storage::{
    DuplicateGroup, ExportReport, OrphanFile, StorageLayout, StorageUsage, sanitize,
};
pub use types::{
    DownloadTask, Event, ImageInfo, ModelInfo, ModelType, ProgressCallback, ProgressUpdate,
    QueueStats, Status,
};

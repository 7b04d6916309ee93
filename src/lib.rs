//! CloudBeats backup generator
//!
//! Reconciles a local Dropbox-synced music folder against the Dropbox
//! listing, reads audio tags with a bounded worker pool backed by a
//! size/mtime-validated cache, and writes a `.cbbackup` file for the
//! CloudBeats player.

pub mod backup;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod credentials;
pub mod error;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod remote;
pub mod scanner;
pub mod tags;

pub use cache::MetadataCache;
pub use cancel::CancellationToken;
pub use config::{ClientConfig, ProgressMode, RunConfig};
pub use credentials::Credentials;
pub use error::{ApiError, AuthError, Error, ExtractionError, ScanError, ScanErrorKind};
pub use matcher::reconcile;
pub use models::{EntryKind, MatchedPair, Metadata, ReconciliationResult, RemoteEntry};
pub use pipeline::{extract_metadata, ExtractionReport, RunSummary};
pub use pool::WorkerPool;
pub use progress::ProgressReporter;
pub use remote::{DropboxClient, OAuthClient};
pub use scanner::scan_audio_files;

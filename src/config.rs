//! Configuration for the backup generator

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under the platform cache and config dirs
pub const APP_DIR: &str = "cloudbeats-backup-generator";

/// Default output file
pub const DEFAULT_OUTPUT: &str = "cloudbeats.cbbackup";

/// Dropbox RPC endpoint base
pub const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com/2";

/// OAuth2 token endpoint
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://api.dropboxapi.com/oauth2/token";

/// OAuth2 authorization page
pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";

/// Default HTTP request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// First wait after a 429 without a Retry-After header
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for any rate-limit wait
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Recognized audio extensions (lowercase, without dot)
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "flac", "ogg", "opus", "wav", "wma", "aac", "dsf", "aiff", "aif", "ape", "wv",
    "mpc",
];

/// Check whether a file name or path has a recognized audio extension.
/// The comparison is case-insensitive.
pub fn is_audio_file(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Remote API client settings, passed explicitly to every client constructor
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for RPC calls such as `/files/list_folder`
    pub api_base: String,
    /// OAuth2 token endpoint
    pub token_endpoint: String,
    /// OAuth2 authorization page
    pub authorize_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// First backoff step for rate-limited calls
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// How extraction progress is written to stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProgressMode {
    /// Single self-overwriting `Reading tags: n/total` line
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// No progress output
    Off,
}

/// Configuration for one backup run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Local folder to scan; must live inside the Dropbox folder
    pub local_dir: PathBuf,

    /// Path of the `.cbbackup` file to write
    pub output: PathBuf,

    /// Number of extraction workers
    /// 0 means auto-detect (CPU cores × 2)
    pub workers: usize,

    /// Tag cache location. `None` uses the platform cache dir.
    pub cache_path: Option<PathBuf>,

    /// Whether to consult and update the tag cache
    pub use_cache: bool,

    /// Stop after matching and print a summary
    pub dry_run: bool,

    /// Progress output
    pub progress: ProgressMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::new(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            workers: 0,
            cache_path: None,
            use_cache: true,
            dry_run: false,
            progress: ProgressMode::default(),
        }
    }
}

impl RunConfig {
    /// Create a config builder
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::new()
    }

    /// Get the effective number of workers
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            // Auto-detect: CPU cores × 2
            std::thread::available_parallelism()
                .map(|p| p.get() * 2)
                .unwrap_or(4)
        } else {
            self.workers
        }
    }

    /// Get the effective cache path
    pub fn effective_cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(default_cache_path)
    }
}

/// `<user cache dir>/cloudbeats-backup-generator/cache.db`, falling back to the temp dir
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("cache.db")
}

/// Builder for RunConfig
#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local folder to scan
    pub fn local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.local_dir = dir.into();
        self
    }

    /// Set the output file
    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.config.output = output.into();
        self
    }

    /// Set the number of workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the cache path
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_path = Some(path.into());
        self
    }

    /// Enable or disable the tag cache
    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.config.use_cache = enabled;
        self
    }

    /// Enable or disable dry-run mode
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.config.dry_run = enabled;
        self
    }

    /// Set the progress output mode
    pub fn progress(mut self, mode: ProgressMode) -> Self {
        self.config.progress = mode;
        self
    }

    /// Build the config
    pub fn build(self) -> RunConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT));
        assert!(config.use_cache);
        assert!(!config.dry_run);
        assert_eq!(config.workers, 0);
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file("song.mp3"));
        assert!(is_audio_file("song.MP3"));
        assert!(is_audio_file("/music/track.flac"));
        assert!(is_audio_file("a.AIFF"));
        assert!(!is_audio_file("cover.jpg"));
        assert!(!is_audio_file("README"));
        assert!(!is_audio_file(".DS_Store"));
    }

    #[test]
    fn test_config_builder() {
        let config = RunConfig::builder()
            .local_dir("/music")
            .output("out.cbbackup")
            .workers(3)
            .use_cache(false)
            .dry_run(true)
            .progress(ProgressMode::Json)
            .build();

        assert_eq!(config.local_dir, PathBuf::from("/music"));
        assert_eq!(config.output, PathBuf::from("out.cbbackup"));
        assert_eq!(config.effective_workers(), 3);
        assert!(!config.use_cache);
        assert!(config.dry_run);
        assert_eq!(config.progress, ProgressMode::Json);
    }

    #[test]
    fn test_effective_workers_auto() {
        let config = RunConfig::default();
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn test_effective_cache_path() {
        let config = RunConfig::builder().cache_path("/tmp/x.db").build();
        assert_eq!(config.effective_cache_path(), PathBuf::from("/tmp/x.db"));

        let default = RunConfig::default().effective_cache_path();
        assert!(default.ends_with("cloudbeats-backup-generator/cache.db"));
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::from_secs(60));
        assert!(config.api_base.starts_with("https://"));
    }
}

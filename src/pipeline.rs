//! Backup run: listing, reconciliation, cache-aware extraction and output.

use std::path::{Path, PathBuf};

use crate::backup::{self, Backup};
use crate::cache::MetadataCache;
use crate::cancel::CancellationToken;
use crate::config::RunConfig;
use crate::error::{Error, ExtractionError, TaskError};
use crate::matcher::reconcile;
use crate::models::{MatchedPair, Metadata, ReconciliationResult};
use crate::pool::WorkerPool;
use crate::progress::{DoneSummary, ProgressReporter};
use crate::remote::DropboxClient;
use crate::scanner::scan_audio_files;
use crate::tags;

/// Outcome of the extraction phase
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// One record per matched pair, in matched order. Failed and unstarted
    /// slots hold fallback metadata.
    pub metadata: Vec<Metadata>,
    /// Files whose extraction failed
    pub failures: Vec<(PathBuf, String)>,
    pub cache_hits: usize,
    pub parsed: usize,
    /// Some items were never started because the run was cancelled
    pub cancelled: bool,
}

/// Extract metadata for every matched file.
///
/// Workers consult `cache` read-only; successful fresh extractions are
/// stored only after the pool has joined. Failures are logged and replaced
/// by [`Metadata::fallback`] so the run can complete.
pub fn extract_metadata<F>(
    matched: &[MatchedPair],
    mut cache: Option<&mut MetadataCache>,
    pool: &WorkerPool,
    cancel: &CancellationToken,
    reporter: &ProgressReporter,
    extract: F,
) -> ExtractionReport
where
    F: Fn(&Path) -> Result<Metadata, ExtractionError> + Sync,
{
    reporter.report_start(matched.len(), pool.workers());

    let results = {
        let cache = cache.as_deref();
        pool.run(
            matched,
            cancel,
            |pair| -> Result<(Metadata, bool), ExtractionError> {
                if let Some(hit) = cache.and_then(|c| c.lookup(&pair.local_path)) {
                    return Ok((hit, true));
                }
                extract(&pair.local_path).map(|meta| (meta, false))
            },
            |done, total| {
                reporter.report_progress(done, total);
            },
        )
    };

    let mut report = ExtractionReport {
        metadata: Vec::with_capacity(matched.len()),
        ..ExtractionReport::default()
    };

    for (pair, result) in matched.iter().zip(results) {
        let path = &pair.local_path;
        let error = match result {
            Ok((meta, true)) => {
                report.cache_hits += 1;
                report.metadata.push(meta);
                continue;
            }
            Ok((meta, false)) => {
                report.parsed += 1;
                if let Some(cache) = cache.as_deref_mut() {
                    cache.store(path, meta.clone());
                }
                report.metadata.push(meta);
                continue;
            }
            Err(TaskError::Cancelled) => {
                report.cancelled = true;
                report.metadata.push(Metadata::fallback(path));
                continue;
            }
            Err(TaskError::Failed(e)) => e,
            Err(TaskError::Panicked(msg)) => ExtractionError::Panicked(msg),
        };

        log::warn!("Could not read tags from {}: {}", path.display(), error);
        reporter.report_error(&path.to_string_lossy(), &error.to_string());
        report.failures.push((path.clone(), error.to_string()));
        report.metadata.push(Metadata::fallback(path));
    }

    reporter.report_done(DoneSummary {
        cache_hits: report.cache_hits,
        parsed: report.parsed,
        failures: report.failures.len(),
        cancelled: report.cancelled,
    });
    report
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub remote_path: String,
    pub local_files: usize,
    pub remote_files: usize,
    pub matched: usize,
    pub unmatched_local: usize,
    pub unmatched_remote: usize,
    pub cache_hits: usize,
    pub parsed: usize,
    pub failures: usize,
    /// Backup file written; `None` for a dry run
    pub output: Option<PathBuf>,
}

impl RunSummary {
    fn from_reconciliation(
        remote_path: &str,
        local_files: usize,
        remote_files: usize,
        result: &ReconciliationResult,
    ) -> Self {
        Self {
            remote_path: remote_path.to_string(),
            local_files,
            remote_files,
            matched: result.matched.len(),
            unmatched_local: result.unmatched_local.len(),
            unmatched_remote: result.unmatched_remote.len(),
            ..Self::default()
        }
    }
}

/// Run a full backup with the lofty tag reader
pub fn run(
    config: &RunConfig,
    client: &DropboxClient,
    remote_path: &str,
    cancel: &CancellationToken,
) -> Result<RunSummary, Error> {
    run_with(config, client, remote_path, cancel, tags::read_metadata)
}

/// Run a full backup with a caller-supplied extraction function.
///
/// `config.local_dir` must be the local counterpart of `remote_path`.
pub fn run_with<F>(
    config: &RunConfig,
    client: &DropboxClient,
    remote_path: &str,
    cancel: &CancellationToken,
    extract: F,
) -> Result<RunSummary, Error>
where
    F: Fn(&Path) -> Result<Metadata, ExtractionError> + Sync,
{
    let account_id = client.get_account_id()?;
    log::info!("Authenticated as {}", account_id);

    log::info!("Scanning {}", config.local_dir.display());
    let local_files = scan_audio_files(&config.local_dir)?;
    log::info!("Found {} local audio files", local_files.len());

    let remote_entries = client.list_folder(remote_path)?;

    let result = reconcile(&config.local_dir, remote_path, &local_files, &remote_entries);
    for path in &result.unmatched_local {
        log::debug!("No remote match for {}", path.display());
    }
    for entry in &result.unmatched_remote {
        log::debug!("No local match for {}", entry.path_display);
    }

    let mut summary = RunSummary::from_reconciliation(
        remote_path,
        local_files.len(),
        remote_entries.len(),
        &result,
    );
    if config.dry_run {
        return Ok(summary);
    }

    let mut cache = if config.use_cache {
        let path = config.effective_cache_path();
        let cache = MetadataCache::load(&path);
        log::debug!("Loaded {} cached entries from {}", cache.len(), path.display());
        Some(cache)
    } else {
        None
    };

    let pool = WorkerPool::new(config.effective_workers())?;
    let reporter = ProgressReporter::new(config.progress, 200);
    let report = extract_metadata(
        &result.matched,
        cache.as_mut(),
        &pool,
        cancel,
        &reporter,
        extract,
    );

    if let Some(cache) = cache.as_mut() {
        match cache.persist() {
            Ok(true) => log::debug!("Tag cache saved ({} entries)", cache.len()),
            Ok(false) => {}
            Err(e) => log::warn!("Could not save tag cache: {}", e),
        }
    }

    if report.cancelled || cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    summary.cache_hits = report.cache_hits;
    summary.parsed = report.parsed;
    summary.failures = report.failures.len();
    if !report.failures.is_empty() {
        log::warn!(
            "{} files could not be read; default tags were used for them",
            report.failures.len()
        );
    }

    let backup = Backup {
        items: backup::build_items(&account_id, &result.matched, &report.metadata),
        playlists: Vec::new(),
    };
    backup::write(&config.output, &backup)?;
    summary.output = Some(config.output.clone());

    Ok(summary)
}

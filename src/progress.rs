//! Progress reporting for the tag extraction phase
//!
//! Messages go to stderr, either as human-readable lines or as one JSON
//! object per line for wrapping tools. Stdout stays free for the run summary.

use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crate::config::ProgressMode;

/// Start message sent when extraction begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Number of matched files to process
    pub total: usize,
    /// Worker threads
    pub workers: usize,
}

impl StartMessage {
    pub fn new(seq: u64, ts: u64, total: usize, workers: usize) -> Self {
        Self {
            msg_type: "start",
            seq,
            ts,
            total,
            workers,
        }
    }
}

/// Progress message sent while workers complete files
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    /// Files completed so far
    #[serde(rename = "n")]
    pub completed: usize,
    /// Files in this run
    #[serde(rename = "of")]
    pub total: usize,
    /// Estimated remaining time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
}

impl ProgressMessage {
    pub fn new(seq: u64, ts: u64, completed: usize, total: usize, eta_ms: Option<u64>) -> Self {
        Self {
            msg_type: "p",
            seq,
            ts,
            completed,
            total,
            eta_ms,
        }
    }
}

/// Per-file failure, reported immediately
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    pub message: String,
    pub path: String,
}

impl ErrorProgressMessage {
    pub fn new(seq: u64, ts: u64, message: String, path: String) -> Self {
        Self {
            msg_type: "err",
            seq,
            ts,
            message,
            path,
        }
    }
}

/// Done message with extraction totals
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    /// Served from the cache
    #[serde(rename = "hit")]
    pub cache_hits: usize,
    /// Read from disk
    #[serde(rename = "parsed")]
    pub parsed: usize,
    /// Failed extractions (fallback metadata used)
    #[serde(rename = "ec")]
    pub failures: usize,
    /// Whether the run was interrupted
    pub cancelled: bool,
    /// Extraction duration in milliseconds
    pub ms: u64,
}

/// Final counts handed to [`ProgressReporter::report_done`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoneSummary {
    pub cache_hits: usize,
    pub parsed: usize,
    pub failures: usize,
    pub cancelled: bool,
}

/// Progress reporter writing to stderr.
///
/// Safe to share across worker threads. Progress lines are throttled to one
/// per interval, except the final one.
pub struct ProgressReporter {
    mode: ProgressMode,
    /// Minimum interval between progress messages
    interval_ms: u64,
    last_report: Mutex<Option<Instant>>,
    seq: AtomicU64,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(mode: ProgressMode, interval_ms: u64) -> Self {
        Self {
            mode,
            interval_ms,
            last_report: Mutex::new(None),
            seq: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Reporter that prints nothing
    pub fn disabled() -> Self {
        Self::new(ProgressMode::Off, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != ProgressMode::Off
    }

    /// Next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Whether the interval elapsed since the last progress line. Records
    /// `now` as the last report time when it did.
    fn take_slot(&self, force: bool) -> bool {
        let mut last = self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let due = force
            || last.map_or(true, |t| {
                t.elapsed().as_millis() as u64 >= self.interval_ms
            });
        if due {
            *last = Some(Instant::now());
        }
        due
    }

    fn emit<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            eprintln!("{}", json);
            std::io::stderr().flush().ok();
        }
    }

    pub fn report_start(&self, total: usize, workers: usize) {
        match self.mode {
            ProgressMode::Off => {}
            ProgressMode::Text => {
                eprintln!("Reading tags for {} files with {} workers", total, workers)
            }
            ProgressMode::Json => self.emit(&StartMessage::new(
                self.next_seq(),
                self.current_timestamp(),
                total,
                workers,
            )),
        }
    }

    /// Report `completed` of `total` files done.
    ///
    /// Returns true if a line was written.
    pub fn report_progress(&self, completed: usize, total: usize) -> bool {
        if !self.is_enabled() || !self.take_slot(completed >= total) {
            return false;
        }

        let ts = self.current_timestamp();
        let eta_ms = estimate_remaining(ts, completed, total);
        match self.mode {
            ProgressMode::Off => return false,
            ProgressMode::Text => {
                eprint!("\rReading tags: {}/{}", completed, total);
                if completed >= total {
                    eprintln!();
                }
                std::io::stderr().flush().ok();
            }
            ProgressMode::Json => self.emit(&ProgressMessage::new(
                self.next_seq(),
                ts,
                completed,
                total,
                eta_ms,
            )),
        }
        true
    }

    /// Report a per-file failure. Text mode leaves this to the log.
    pub fn report_error(&self, path: &str, message: &str) {
        if self.mode == ProgressMode::Json {
            self.emit(&ErrorProgressMessage::new(
                self.next_seq(),
                self.current_timestamp(),
                message.to_string(),
                path.to_string(),
            ));
        }
    }

    pub fn report_done(&self, summary: DoneSummary) {
        match self.mode {
            ProgressMode::Off | ProgressMode::Text => {}
            ProgressMode::Json => {
                let ts = self.current_timestamp();
                self.emit(&DoneMessage {
                    msg_type: "done",
                    seq: self.next_seq(),
                    ts,
                    cache_hits: summary.cache_hits,
                    parsed: summary.parsed,
                    failures: summary.failures,
                    cancelled: summary.cancelled,
                    ms: ts,
                })
            }
        }
    }
}

/// Linear extrapolation of the remaining time
fn estimate_remaining(elapsed_ms: u64, completed: usize, total: usize) -> Option<u64> {
    if completed == 0 || completed >= total {
        return None;
    }
    let per_item = elapsed_ms as f64 / completed as f64;
    Some((per_item * (total - completed) as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_message_serialization() {
        let msg = StartMessage::new(0, 5, 120, 8);
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();

        assert_eq!(parsed["_t"], "start");
        assert_eq!(parsed["total"], 120);
        assert_eq!(parsed["workers"], 8);
    }

    #[test]
    fn test_progress_message_serialization() {
        let msg = ProgressMessage::new(2, 200, 30, 120, Some(600));
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();

        assert_eq!(parsed["_t"], "p");
        assert_eq!(parsed["seq"], 2);
        assert_eq!(parsed["n"], 30);
        assert_eq!(parsed["of"], 120);
        assert_eq!(parsed["eta_ms"], 600);

        let json = serde_json::to_string(&ProgressMessage::new(1, 1, 1, 1, None)).unwrap();
        assert!(!json.contains("eta_ms"));
    }

    #[test]
    fn test_done_message_serialization() {
        let msg = DoneMessage {
            msg_type: "done",
            seq: 9,
            ts: 900,
            cache_hits: 40,
            parsed: 10,
            failures: 2,
            cancelled: false,
            ms: 900,
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();

        assert_eq!(parsed["_t"], "done");
        assert_eq!(parsed["hit"], 40);
        assert_eq!(parsed["parsed"], 10);
        assert_eq!(parsed["ec"], 2);
        assert_eq!(parsed["cancelled"], false);
    }

    #[test]
    fn test_estimate_remaining() {
        assert_eq!(estimate_remaining(1000, 0, 10), None);
        assert_eq!(estimate_remaining(1000, 10, 10), None);
        assert_eq!(estimate_remaining(1000, 5, 10), Some(1000));
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        let reporter = ProgressReporter::disabled();
        assert!(!reporter.is_enabled());
        assert!(!reporter.report_progress(1, 2));
        reporter.report_start(2, 1);
        reporter.report_done(DoneSummary::default());
        // Nothing consumed a sequence number
        assert_eq!(reporter.next_seq(), 0);
    }

    #[test]
    fn test_throttling_and_final_report() {
        let reporter = ProgressReporter::new(ProgressMode::Json, 60_000);

        assert!(reporter.report_progress(1, 10));
        assert!(!reporter.report_progress(2, 10));
        // Completion is always reported
        assert!(reporter.report_progress(10, 10));
    }

    #[test]
    fn test_reporter_is_shareable_across_threads() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<ProgressReporter>();
    }
}

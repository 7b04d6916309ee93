//! Core data models for reconciliation and tag extraction

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Kind of a remote listing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    /// Parse the Dropbox `.tag` value. Deleted entries and unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "file" => Some(EntryKind::File),
            "folder" => Some(EntryKind::Folder),
            _ => None,
        }
    }
}

/// A file or folder from the remote listing. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub kind: EntryKind,
    /// Stable remote identifier (`id:...`)
    pub id: String,
    pub name: String,
    /// Lowercased full remote path; the matching identity
    pub path_lower: String,
    /// Full remote path with original casing
    pub path_display: String,
}

impl RemoteEntry {
    /// Create a file entry
    pub fn file(
        id: impl Into<String>,
        name: impl Into<String>,
        path_lower: impl Into<String>,
        path_display: impl Into<String>,
    ) -> Self {
        Self {
            kind: EntryKind::File,
            id: id.into(),
            name: name.into(),
            path_lower: path_lower.into(),
            path_display: path_display.into(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// A local file paired with its remote counterpart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub local_path: PathBuf,
    pub remote: RemoteEntry,
}

/// Output of the matcher.
///
/// Every scanned local path lands in exactly one of `matched` or
/// `unmatched_local`; every remote audio file lands in exactly one of
/// `matched` or `unmatched_remote`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub matched: Vec<MatchedPair>,
    pub unmatched_local: Vec<PathBuf>,
    pub unmatched_remote: Vec<RemoteEntry>,
}

/// Audio metadata for one file. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub genre: Option<String>,
    /// 0 when unknown
    pub year: u32,
    pub track_number: Option<u32>,
    pub disk_number: u32,
    pub duration_secs: f64,
}

impl Metadata {
    /// Best-effort record used when a file's tags cannot be read:
    /// the file stem as title and `Unknown` for the artist/album fields.
    pub fn fallback(path: &Path) -> Self {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            title,
            artist: "Unknown".to_string(),
            album: "Unknown".to_string(),
            album_artist: "Unknown".to_string(),
            genre: None,
            year: 0,
            track_number: None,
            disk_number: 1,
            duration_secs: 0.0,
        }
    }
}

/// `(size, mtime)` pair deciding whether cached metadata is still valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidityKey {
    /// File size in bytes
    pub size: u64,
    /// Modification time in nanoseconds relative to the Unix epoch
    pub mod_time_ns: i64,
}

impl ValidityKey {
    /// Stat the file at `path`
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified = metadata.modified()?;
        let mod_time_ns = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_nanos() as i64,
            Err(e) => -(e.duration().as_nanos() as i64),
        };
        Ok(Self {
            size: metadata.len(),
            mod_time_ns,
        })
    }
}

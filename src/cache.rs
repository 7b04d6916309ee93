//! Tag cache persisted in SQLite.
//!
//! Entries are keyed by absolute local path and stamped with the file's
//! `(size, mtime_ns)` at store time. A lookup only hits when the file on disk
//! still has exactly that pair. This is a heuristic, not a content hash:
//! - an edit that preserves both size and mtime (e.g. a tag rewrite followed
//!   by an mtime restore) is served stale metadata;
//! - a touch without a content change forces a needless re-read.
//!
//! The map is loaded once, read concurrently by workers during extraction,
//! and only mutated after the pool has joined.

use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::models::{Metadata, ValidityKey};

/// One cached record
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: ValidityKey,
    pub metadata: Metadata,
}

/// Metadata cache validated by file size and modification time
#[derive(Debug)]
pub struct MetadataCache {
    /// Database file; `None` keeps the cache in memory only
    path: Option<PathBuf>,
    entries: HashMap<PathBuf, CacheEntry>,
    dirty: bool,
    /// The file on disk could not be read and must be recreated on persist
    corrupt: bool,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tag_cache (
        path TEXT PRIMARY KEY,
        size INTEGER NOT NULL,
        mtime_ns INTEGER NOT NULL,
        title TEXT NOT NULL,
        artist TEXT NOT NULL,
        album TEXT NOT NULL,
        album_artist TEXT NOT NULL,
        genre TEXT,
        year INTEGER NOT NULL,
        track_number INTEGER,
        disk_number INTEGER NOT NULL,
        duration_secs REAL NOT NULL
    );
";

impl MetadataCache {
    /// Cache that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
            dirty: false,
            corrupt: false,
        }
    }

    /// Load the cache at `path`.
    ///
    /// A missing file yields an empty cache. An unreadable or malformed file
    /// also yields an empty cache, with a warning, and is replaced on the
    /// next [`persist`](Self::persist).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut cache = Self {
            path: Some(path.clone()),
            ..Self::in_memory()
        };

        if !path.exists() {
            return cache;
        }

        match read_entries(&path) {
            Ok(entries) => cache.entries = entries,
            Err(e) => {
                log::warn!("Ignoring unreadable tag cache {}: {}", path.display(), e);
                cache.corrupt = true;
            }
        }
        cache
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether entries changed since load
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Return cached metadata if the file's current size and mtime equal the
    /// stored ones. A file that cannot be stat'd is a miss.
    pub fn lookup(&self, path: &Path) -> Option<Metadata> {
        let entry = self.entries.get(path)?;
        let current = ValidityKey::from_path(path).ok()?;
        if current == entry.key {
            Some(entry.metadata.clone())
        } else {
            None
        }
    }

    /// Record metadata for `path` stamped with the file's current validity key.
    ///
    /// Returns `false` (and leaves the cache untouched) when the file cannot
    /// be stat'd.
    pub fn store(&mut self, path: &Path, metadata: Metadata) -> bool {
        let key = match ValidityKey::from_path(path) {
            Ok(key) => key,
            Err(e) => {
                log::debug!("Not caching {}: {}", path.display(), e);
                return false;
            }
        };
        self.entries
            .insert(path.to_path_buf(), CacheEntry { key, metadata });
        self.dirty = true;
        true
    }

    /// Write the full map to disk if it changed since load.
    ///
    /// Returns `Ok(true)` when something was written.
    pub fn persist(&mut self) -> Result<bool, CacheError> {
        if !self.dirty {
            return Ok(false);
        }
        let Some(path) = self.path.clone() else {
            return Ok(false);
        };

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        if self.corrupt && path.exists() {
            fs::remove_file(&path)?;
        }

        write_entries(&path, &self.entries)?;
        self.dirty = false;
        self.corrupt = false;
        Ok(true)
    }
}

fn read_entries(path: &Path) -> Result<HashMap<PathBuf, CacheEntry>, CacheError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(
        "SELECT path, size, mtime_ns, title, artist, album, album_artist, genre, year,
                track_number, disk_number, duration_secs
         FROM tag_cache",
    )?;

    let rows = stmt.query_map([], |row| {
        let path: String = row.get(0)?;
        let entry = CacheEntry {
            key: ValidityKey {
                size: row.get::<_, i64>(1)? as u64,
                mod_time_ns: row.get(2)?,
            },
            metadata: Metadata {
                title: row.get(3)?,
                artist: row.get(4)?,
                album: row.get(5)?,
                album_artist: row.get(6)?,
                genre: row.get(7)?,
                year: row.get(8)?,
                track_number: row.get(9)?,
                disk_number: row.get(10)?,
                duration_secs: row.get(11)?,
            },
        };
        Ok((PathBuf::from(path), entry))
    })?;

    let mut entries = HashMap::new();
    for row in rows {
        let (path, entry) = row?;
        entries.insert(path, entry);
    }
    Ok(entries)
}

fn write_entries(path: &Path, entries: &HashMap<PathBuf, CacheEntry>) -> Result<(), CacheError> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;

    let tx = conn.transaction()?;
    {
        tx.execute("DELETE FROM tag_cache", [])?;
        let mut stmt = tx.prepare(
            "INSERT INTO tag_cache
             (path, size, mtime_ns, title, artist, album, album_artist, genre, year,
              track_number, disk_number, duration_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;

        for (file, entry) in entries {
            let meta = &entry.metadata;
            stmt.execute(params![
                file.to_string_lossy().into_owned(),
                entry.key.size as i64,
                entry.key.mod_time_ns,
                meta.title,
                meta.artist,
                meta.album,
                meta.album_artist,
                meta.genre,
                meta.year,
                meta.track_number,
                meta.disk_number,
                meta.duration_secs,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

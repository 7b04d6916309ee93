//! CloudBeats `.cbbackup` output
//!
//! The file is read by the CloudBeats app, so the field names, their order
//! and the omission of absent optional fields are part of the format.

use serde::{Serialize, Serializer};
use std::fs;
use std::path::Path;

use crate::error::Error;
use crate::models::{MatchedPair, Metadata};

/// Service tag CloudBeats uses for Dropbox-backed items
pub const SERVICE: &str = "dropbox";

/// Top-level backup document
#[derive(Debug, Clone, Default, Serialize)]
pub struct Backup {
    pub items: Vec<Item>,
    pub playlists: Vec<Playlist>,
}

/// Playlists are never generated; the list is always empty
#[derive(Debug, Clone, Default, Serialize)]
pub struct Playlist {}

/// One audio file. Fields are declared in the alphabetical key order the
/// app writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub account_id: String,
    /// Remote file id
    pub key: String,
    pub name: String,
    pub path: String,
    pub service: String,
    #[serde(rename = "tag_album")]
    pub album: String,
    #[serde(rename = "tag_albumArtist")]
    pub album_artist: String,
    #[serde(rename = "tag_artist")]
    pub artist: String,
    #[serde(rename = "tag_diskNumber")]
    pub disk_number: u32,
    #[serde(rename = "tag_duration", serialize_with = "one_decimal")]
    pub duration_secs: f64,
    #[serde(rename = "tag_genre", skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(rename = "tag_name")]
    pub title: String,
    #[serde(rename = "tag_trackNumber", skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(rename = "tag_year")]
    pub year: u32,
}

impl Item {
    pub fn new(account_id: &str, pair: &MatchedPair, meta: &Metadata) -> Self {
        Self {
            account_id: account_id.to_string(),
            key: pair.remote.id.clone(),
            name: pair.remote.name.clone(),
            path: String::new(),
            service: SERVICE.to_string(),
            album: meta.album.clone(),
            album_artist: meta.album_artist.clone(),
            artist: meta.artist.clone(),
            disk_number: meta.disk_number,
            duration_secs: meta.duration_secs,
            genre: meta.genre.clone().filter(|g| !g.is_empty()),
            title: meta.title.clone(),
            track_number: meta.track_number,
            year: meta.year,
        }
    }
}

/// Durations are always written with exactly one decimal (`294.0`)
fn one_decimal<S: Serializer>(secs: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((secs * 10.0).round() / 10.0)
}

/// Pair each matched file with its metadata. Both slices are in the same
/// order.
pub fn build_items(account_id: &str, matched: &[MatchedPair], metadata: &[Metadata]) -> Vec<Item> {
    matched
        .iter()
        .zip(metadata)
        .map(|(pair, meta)| Item::new(account_id, pair, meta))
        .collect()
}

/// Write the backup as minified JSON
pub fn write(path: &Path, backup: &Backup) -> Result<(), Error> {
    let data = serde_json::to_vec(backup).map_err(|source| Error::Json {
        context: "backup",
        source,
    })?;
    fs::write(path, data)
        .map_err(|e| Error::io(format!("writing backup file {}", path.display()), e))?;
    log::info!("Wrote {} items to {}", backup.items.len(), path.display());
    Ok(())
}

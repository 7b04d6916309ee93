//! Audio tag reading using lofty.
//!
//! Missing or empty tags fall back to [`Metadata::fallback`] values, so a
//! file with no tags at all still yields a usable record. Formats lofty does
//! not support (WMA, DSF) are treated the same way. Only a file lofty
//! cannot open, or one of a supported format that fails to parse, is an
//! error.

use lofty::error::ErrorKind;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::path::Path;

use crate::error::ExtractionError;
use crate::models::Metadata;

/// Read tags and duration from one audio file
pub fn read_metadata(path: &Path) -> Result<Metadata, ExtractionError> {
    let tagged_file = match Probe::open(path).and_then(|probe| probe.read()) {
        Ok(file) => file,
        Err(e) if matches!(e.kind(), ErrorKind::UnknownFormat) => {
            log::debug!("No tag support for {}, using defaults", path.display());
            return Ok(Metadata::fallback(path));
        }
        Err(e) => return Err(ExtractionError::Unreadable(e.to_string())),
    };

    let mut meta = Metadata::fallback(path);
    meta.duration_secs = tagged_file.properties().duration().as_secs_f64();

    if let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    {
        apply_tag(&mut meta, tag);
    }

    Ok(meta)
}

fn apply_tag(meta: &mut Metadata, tag: &Tag) {
    if let Some(v) = non_empty(tag.title().as_deref()) {
        meta.title = v;
    }
    if let Some(v) = non_empty(tag.artist().as_deref()) {
        meta.artist = v;
    }
    if let Some(v) = non_empty(tag.album().as_deref()) {
        meta.album = v;
    }
    if let Some(v) = non_empty(tag.get_string(&ItemKey::AlbumArtist)) {
        meta.album_artist = v;
    }
    meta.genre = non_empty(tag.genre().as_deref());

    meta.year = tag
        .year()
        .or_else(|| tag.get_string(&ItemKey::RecordingDate).and_then(parse_year))
        .unwrap_or(0);

    meta.track_number = tag
        .track()
        .or_else(|| tag.get_string(&ItemKey::TrackNumber).and_then(parse_slash_number));

    if let Some(disk) = tag
        .disk()
        .or_else(|| tag.get_string(&ItemKey::DiscNumber).and_then(parse_slash_number))
    {
        meta.disk_number = disk;
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Leading four-digit year of a date such as `1997-05-21`
pub fn parse_year(date: &str) -> Option<u32> {
    let head = date.trim().get(..4)?;
    if head.bytes().all(|b| b.is_ascii_digit()) {
        head.parse().ok()
    } else {
        None
    }
}

/// Number before an optional slash: `"3/12"` gives 3
pub fn parse_slash_number(value: &str) -> Option<u32> {
    let head = value.split('/').next().unwrap_or(value);
    head.trim().parse().ok()
}

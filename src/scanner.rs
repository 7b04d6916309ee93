//! Scanner module - walks the local folder and collects audio files

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::is_audio_file;
use crate::error::ScanError;

/// Recursively collect every file under `root` with a recognized audio
/// extension.
///
/// Directories are traversed but never returned. The first walk error
/// aborts the scan.
pub fn scan_audio_files(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !root.exists() {
        return Err(ScanError::not_found(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut dirs = 0u64;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;

        if entry.file_type().is_dir() {
            dirs += 1;
            continue;
        }

        if is_audio_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    log::debug!(
        "Scanned {} directories under {}, {} audio files",
        dirs,
        root.display(),
        files.len()
    );
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanErrorKind;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_filters_audio_extensions() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        touch(&root.join("song.mp3"));
        touch(&root.join("Album/01 Track.FLAC"));
        touch(&root.join("Album/cover.jpg"));
        touch(&root.join("Album/Disc 2/02.m4a"));
        touch(&root.join("notes.txt"));
        fs::create_dir_all(root.join("empty.mp3.d")).unwrap();

        let mut files = scan_audio_files(root).unwrap();
        files.sort();

        let mut expected = vec![
            root.join("Album/01 Track.FLAC"),
            root.join("Album/Disc 2/02.m4a"),
            root.join("song.mp3"),
        ];
        expected.sort();
        assert_eq!(files, expected);
    }

    #[test]
    fn test_scan_does_not_yield_directories_with_audio_names() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("weird.mp3")).unwrap();

        let files = scan_audio_files(dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let dir = tempdir().unwrap();
        let err = scan_audio_files(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::NotFound);
    }
}

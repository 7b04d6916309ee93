//! Locating the Dropbox desktop folder and mapping local paths into it

use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Default, Deserialize)]
struct InfoJson {
    personal: Option<InfoAccount>,
    business: Option<InfoAccount>,
}

#[derive(Debug, Default, Deserialize)]
struct InfoAccount {
    #[serde(default)]
    path: String,
}

/// Candidate `info.json` locations under a home directory, in lookup order
fn info_candidates(home: &Path) -> [PathBuf; 2] {
    [
        home.join(".dropbox").join("info.json"),
        home.join("Library")
            .join("Application Support")
            .join("Dropbox")
            .join("info.json"),
    ]
}

/// Find the local Dropbox root from the desktop client's `info.json`
pub fn detect_root_path() -> Result<PathBuf, Error> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("could not determine home directory".to_string()))?;
    detect_root_path_in(&home)
}

/// Same as [`detect_root_path`] with an explicit home directory
pub fn detect_root_path_in(home: &Path) -> Result<PathBuf, Error> {
    for candidate in info_candidates(home) {
        match read_info_json(&candidate) {
            Ok(root) => {
                log::debug!("Dropbox root {} (from {})", root.display(), candidate.display());
                return Ok(root);
            }
            Err(e) => log::debug!("Skipping {}: {}", candidate.display(), e),
        }
    }

    Err(Error::Config(
        "Dropbox Desktop does not appear to be installed. Verify that Dropbox Desktop is \
         installed and that info.json exists (checked ~/.dropbox/info.json and \
         ~/Library/Application Support/Dropbox/info.json)"
            .to_string(),
    ))
}

/// Read the root folder from one `info.json`. The personal account wins over
/// the business one.
pub fn read_info_json(path: &Path) -> Result<PathBuf, Error> {
    let data = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
    let info: InfoJson = serde_json::from_str(&data).map_err(|source| Error::Json {
        context: "info.json",
        source,
    })?;

    [info.personal, info.business]
        .into_iter()
        .flatten()
        .map(|account| account.path)
        .find(|p| !p.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            Error::Config(format!(
                "no personal or business path found in {}",
                path.display()
            ))
        })
}

/// Map a local folder inside the Dropbox root to its remote path.
///
/// Both paths are resolved through symlinks first. Returns `""` for the root
/// itself and `/Rel/Path` otherwise.
pub fn compute_remote_path(local: &Path, dropbox_root: &Path) -> Result<String, Error> {
    let local_resolved = fs::canonicalize(local)
        .map_err(|e| Error::io(format!("resolving local path {}", local.display()), e))?;
    let root_resolved = fs::canonicalize(dropbox_root).map_err(|e| {
        Error::io(
            format!("resolving Dropbox root {}", dropbox_root.display()),
            e,
        )
    })?;

    let rel = local_resolved.strip_prefix(&root_resolved).map_err(|_| {
        Error::Config(format!(
            "the --local folder {} is not located inside the Dropbox folder {}",
            local.display(),
            dropbox_root.display()
        ))
    })?;

    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("/{}", parts.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_info(home: &Path, rel: &[&str], json: &str) {
        let mut path = home.to_path_buf();
        for part in rel {
            path.push(part);
        }
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, json).unwrap();
    }

    #[test]
    fn test_personal_preferred_over_business() {
        let home = tempdir().unwrap();
        write_info(
            home.path(),
            &[".dropbox", "info.json"],
            r#"{"business":{"path":"/b"},"personal":{"path":"/p","host":1}}"#,
        );
        assert_eq!(detect_root_path_in(home.path()).unwrap(), PathBuf::from("/p"));
    }

    #[test]
    fn test_business_only() {
        let home = tempdir().unwrap();
        write_info(
            home.path(),
            &[".dropbox", "info.json"],
            r#"{"business":{"path":"/Work Dropbox"}}"#,
        );
        assert_eq!(
            detect_root_path_in(home.path()).unwrap(),
            PathBuf::from("/Work Dropbox")
        );
    }

    #[test]
    fn test_falls_back_to_macos_location() {
        let home = tempdir().unwrap();
        write_info(home.path(), &[".dropbox", "info.json"], r#"{"personal":{"path":""}}"#);
        write_info(
            home.path(),
            &["Library", "Application Support", "Dropbox", "info.json"],
            r#"{"personal":{"path":"/Users/me/Dropbox"}}"#,
        );
        assert_eq!(
            detect_root_path_in(home.path()).unwrap(),
            PathBuf::from("/Users/me/Dropbox")
        );
    }

    #[test]
    fn test_not_installed() {
        let home = tempdir().unwrap();
        let err = detect_root_path_in(home.path()).unwrap_err();
        assert!(err.to_string().contains("does not appear to be installed"));
    }

    #[test]
    fn test_malformed_info_json() {
        let home = tempdir().unwrap();
        let path = home.path().join("info.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_info_json(&path), Err(Error::Json { .. })));
    }

    #[test]
    fn test_compute_remote_path() {
        let root = tempdir().unwrap();
        let music = root.path().join("Music").join("Lossless");
        fs::create_dir_all(&music).unwrap();

        assert_eq!(compute_remote_path(root.path(), root.path()).unwrap(), "");
        assert_eq!(
            compute_remote_path(&music, root.path()).unwrap(),
            "/Music/Lossless"
        );
    }

    #[test]
    fn test_compute_remote_path_outside_root() {
        let root = tempdir().unwrap();
        let other = tempdir().unwrap();
        let err = compute_remote_path(other.path(), root.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("not located inside the Dropbox folder"));
    }

    #[cfg(unix)]
    #[test]
    fn test_compute_remote_path_through_symlink() {
        let root = tempdir().unwrap();
        let music = root.path().join("Music");
        fs::create_dir_all(&music).unwrap();
        let outside = tempdir().unwrap();
        let link = outside.path().join("link");
        std::os::unix::fs::symlink(&music, &link).unwrap();

        assert_eq!(compute_remote_path(&link, root.path()).unwrap(), "/Music");
    }
}

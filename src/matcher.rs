//! Reconciles scanned local files against the remote listing.
//!
//! Identity is the path relative to the scan root, compared after Unicode
//! canonical composition (NFC) and lowercasing on both sides. Local
//! filesystems disagree on composed vs decomposed accents (macOS stores NFD),
//! so neither side is trusted to be in a particular form.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

use crate::config::is_audio_file;
use crate::models::{MatchedPair, ReconciliationResult, RemoteEntry};

/// NFC-normalize and lowercase a path fragment
pub fn normalize_key(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}

/// Turn `remote_root` (`""` for the Dropbox root, otherwise `/Some/Dir`)
/// into a lowercase prefix without a trailing slash.
fn remote_prefix(remote_root: &str) -> String {
    normalize_key(remote_root.trim_end_matches('/'))
}

/// Path of `local` relative to `root`, using `/` separators
fn relative_slash_path(root: &Path, local: &Path) -> Option<String> {
    let rel = local.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Build the lookup key a local file must hit in the remote index
pub fn local_key(local_root: &Path, remote_root: &str, local: &Path) -> Option<String> {
    let rel = relative_slash_path(local_root, local)?;
    Some(format!("{}/{}", remote_prefix(remote_root), normalize_key(&rel)))
}

/// Match local files against remote entries by normalized relative path.
///
/// `local_root` is the scanned directory and `remote_root` its remote
/// counterpart. Remote folders are ignored. When two remote files share a
/// normalized key the last one in listing order wins and the earlier ones
/// are dropped from every set. A remote entry is matched at most once: when
/// several local files normalize to the same key, the first in `local_files`
/// order is paired and the rest are reported as unmatched local files.
pub fn reconcile(
    local_root: &Path,
    remote_root: &str,
    local_files: &[PathBuf],
    remote_entries: &[RemoteEntry],
) -> ReconciliationResult {
    let files: Vec<(usize, &RemoteEntry)> = remote_entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_file())
        .collect();

    let mut index: HashMap<String, usize> = HashMap::with_capacity(files.len());
    for (i, entry) in &files {
        if let Some(prev) = index.insert(normalize_key(&entry.path_lower), *i) {
            log::warn!(
                "Remote paths {} and {} collide; keeping the latter",
                remote_entries[prev].path_display,
                entry.path_display
            );
        }
    }

    let mut result = ReconciliationResult::default();
    let mut consumed: HashSet<String> = HashSet::new();

    for local in local_files {
        let hit = local_key(local_root, remote_root, local)
            .and_then(|key| index.get(&key).map(|i| (key, *i)));

        match hit {
            Some((key, i)) if consumed.insert(key.clone()) => {
                result.matched.push(MatchedPair {
                    local_path: local.clone(),
                    remote: remote_entries[i].clone(),
                });
            }
            _ => result.unmatched_local.push(local.clone()),
        }
    }

    for (i, entry) in files {
        let key = normalize_key(&entry.path_lower);
        if index.get(&key) != Some(&i) || consumed.contains(&key) {
            continue;
        }
        // Cover art, hidden files etc. were never eligible for matching
        if is_audio_file(&entry.name) {
            result.unmatched_remote.push(entry.clone());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(display: &str) -> RemoteEntry {
        let name = display.rsplit('/').next().unwrap_or(display);
        RemoteEntry::file(
            format!("id:{}", display),
            name,
            display.to_lowercase(),
            display,
        )
    }

    #[test]
    fn test_local_files_sharing_a_key_match_once() {
        let local = vec![PathBuf::from("/music/A.mp3"), PathBuf::from("/music/a.mp3")];
        let remote = vec![entry("/Music/A.mp3")];

        let result = reconcile(Path::new("/music"), "/Music", &local, &remote);

        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].local_path, PathBuf::from("/music/A.mp3"));
        assert_eq!(result.unmatched_local, vec![PathBuf::from("/music/a.mp3")]);
        assert!(result.unmatched_remote.is_empty());
    }

    #[test]
    fn test_case_insensitive_match() {
        let local = vec![PathBuf::from("/music/Song.MP3")];
        let remote = vec![entry("/Music/Song.MP3")];

        let result = reconcile(Path::new("/music"), "/Music", &local, &remote);

        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].local_path, local[0]);
        assert_eq!(result.matched[0].remote.id, "id:/Music/Song.MP3");
        assert!(result.unmatched_local.is_empty());
        assert!(result.unmatched_remote.is_empty());
    }

    #[test]
    fn test_decomposed_local_matches_composed_remote() {
        let nfd: String = "café.mp3".nfd().collect();
        let nfc: String = "café.mp3".nfc().collect();
        assert_ne!(nfd, nfc);

        let local = vec![PathBuf::from(format!("/music/{}", nfd))];
        let remote = vec![entry(&format!("/Music/{}", nfc))];

        let result = reconcile(Path::new("/music"), "/Music", &local, &remote);
        assert_eq!(result.matched.len(), 1);
    }

    #[test]
    fn test_composed_local_matches_decomposed_remote() {
        let local = vec![PathBuf::from("/music/caf\u{e9}.mp3")];
        let remote = vec![RemoteEntry::file(
            "id:1",
            "cafe\u{301}.mp3",
            "/music/cafe\u{301}.mp3",
            "/Music/cafe\u{301}.mp3",
        )];

        let result = reconcile(Path::new("/music"), "/Music", &local, &remote);
        assert_eq!(result.matched.len(), 1);
        assert!(result.unmatched_remote.is_empty());
    }

    #[test]
    fn test_unmatched_remote_is_audio_only() {
        let remote = vec![
            entry("/Music/song.mp3"),
            entry("/Music/cover.jpg"),
            entry("/Music/.DS_Store"),
        ];

        let result = reconcile(Path::new("/music"), "/Music", &[], &remote);

        assert_eq!(result.unmatched_remote.len(), 1);
        assert_eq!(result.unmatched_remote[0].name, "song.mp3");
    }

    #[test]
    fn test_unmatched_local() {
        let local = vec![
            PathBuf::from("/music/a.mp3"),
            PathBuf::from("/music/b.mp3"),
        ];
        let remote = vec![entry("/Music/a.mp3")];

        let result = reconcile(Path::new("/music"), "/Music", &local, &remote);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.unmatched_local, vec![PathBuf::from("/music/b.mp3")]);
    }

    #[test]
    fn test_dropbox_root_prefix() {
        let local = vec![PathBuf::from("/home/me/Dropbox/Artist/x.mp3")];
        let remote = vec![entry("/Artist/x.mp3")];

        let result = reconcile(Path::new("/home/me/Dropbox"), "", &local, &remote);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(
            local_key(Path::new("/home/me/Dropbox"), "", &local[0]).unwrap(),
            "/artist/x.mp3"
        );
    }

    #[test]
    fn test_trailing_slash_remote_root() {
        let key = local_key(Path::new("/m"), "/", Path::new("/m/a.mp3")).unwrap();
        assert_eq!(key, "/a.mp3");
        let key = local_key(Path::new("/m"), "/Music/", Path::new("/m/a.mp3")).unwrap();
        assert_eq!(key, "/music/a.mp3");
    }

    #[test]
    fn test_roots_need_not_share_a_name() {
        let local = vec![PathBuf::from("/mnt/sync/Rock/x.flac")];
        let remote = vec![entry("/Audio/Collection/Rock/x.flac")];

        let result = reconcile(
            Path::new("/mnt/sync"),
            "/Audio/Collection",
            &local,
            &remote,
        );
        assert_eq!(result.matched.len(), 1);
    }

    #[test]
    fn test_local_outside_root_is_unmatched() {
        let local = vec![PathBuf::from("/elsewhere/a.mp3")];
        let remote = vec![entry("/Music/a.mp3")];

        let result = reconcile(Path::new("/music"), "/Music", &local, &remote);
        assert_eq!(result.unmatched_local.len(), 1);
        assert_eq!(result.unmatched_remote.len(), 1);
    }

    #[test]
    fn test_colliding_remote_keys_keep_last() {
        let first = RemoteEntry::file("id:1", "A.mp3", "/music/a.mp3", "/Music/A.mp3");
        let second = RemoteEntry::file("id:2", "a.mp3", "/music/a.mp3", "/Music/a.mp3");

        let result = reconcile(
            Path::new("/music"),
            "/Music",
            &[PathBuf::from("/music/a.mp3")],
            &[first, second],
        );
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].remote.id, "id:2");
        assert!(result.unmatched_remote.is_empty());
    }

    #[test]
    fn test_folders_are_ignored() {
        let mut folder = entry("/Music/Album.mp3");
        folder.kind = crate::models::EntryKind::Folder;

        let result = reconcile(Path::new("/music"), "/Music", &[], &[folder]);
        assert!(result.unmatched_remote.is_empty());
    }

    fn name_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop::sample::select(vec!["a", "B", "é", "e\u{301}", "Ü", "z", " ", "-"]),
            1..6,
        )
        .prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn prop_case_and_composition_do_not_affect_matching(
            dir in name_strategy(),
            stem in name_strategy(),
            upper in any::<bool>(),
            decompose_local in any::<bool>(),
        ) {
            let rel = format!("{}/{}.mp3", dir, stem);
            let local_rel: String = if decompose_local {
                rel.nfd().collect()
            } else {
                rel.nfc().collect()
            };
            let local_rel = if upper { local_rel.to_uppercase() } else { local_rel };
            let remote_rel: String = if decompose_local {
                rel.nfc().collect()
            } else {
                rel.nfd().collect()
            };

            let local = vec![PathBuf::from("/root").join(&local_rel)];
            let display = format!("/Remote/{}", remote_rel);
            let remote = vec![entry(&display)];

            let result = reconcile(Path::new("/root"), "/Remote", &local, &remote);
            prop_assert_eq!(result.matched.len(), 1);
        }

        #[test]
        fn prop_partition_invariant(
            local_names in prop::collection::hash_set("[a-d]{1,2}\\.(mp3|flac)", 0..12),
            remote_names in prop::collection::hash_set("[a-d]{1,2}\\.(mp3|flac|jpg|txt)", 0..12),
        ) {
            let local: Vec<PathBuf> = local_names
                .iter()
                .map(|n| PathBuf::from("/l").join(n))
                .collect();
            let remote: Vec<RemoteEntry> = remote_names
                .iter()
                .map(|n| entry(&format!("/R/{}", n)))
                .collect();
            let remote_audio = remote.iter().filter(|e| is_audio_file(&e.name)).count();

            let result = reconcile(Path::new("/l"), "/R", &local, &remote);

            prop_assert_eq!(result.matched.len() + result.unmatched_local.len(), local.len());
            prop_assert_eq!(result.matched.len() + result.unmatched_remote.len(), remote_audio);
            for e in &result.unmatched_remote {
                prop_assert!(is_audio_file(&e.name));
            }
        }
    }
}

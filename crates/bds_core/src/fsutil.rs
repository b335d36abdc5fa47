//! Filesystem helpers shared by stages and the runner.

use std::fs;
use std::path::{Path, PathBuf};

/// Strip characters that are unsafe in output file names.
///
/// Disc titles come from vendor metadata and regularly contain `:`, `/`
/// and similar.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect()
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(['_', ' '], "_")
}

/// Case/spacing-insensitive existence check for an output file.
///
/// Prior versions of ripping tools vary underscores vs spaces in disc
/// names, so a strict `Path::exists` would miss an already-finished
/// conversion.
pub fn file_exists_normalized(target: &Path) -> bool {
    let Some(parent) = target.parent() else {
        return target.exists();
    };
    let Some(target_name) = target.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return false;
    };
    let wanted = normalize_name(&target_name);
    let Ok(entries) = fs::read_dir(parent) else {
        return false;
    };
    entries
        .filter_map(Result::ok)
        .any(|e| normalize_name(&e.file_name().to_string_lossy()) == wanted)
}

/// Find the largest file under `folder` (recursively) with one of the
/// given extensions. MakeMKV names ripped titles itself, so the rip stage
/// discovers its own output this way; the feature title is always the
/// largest file.
pub fn find_largest_file_with_extensions(folder: &Path, extensions: &[&str]) -> Option<PathBuf> {
    let mut best: Option<(u64, PathBuf)> = None;
    for entry in walkdir::WalkDir::new(folder)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if !extensions.iter().any(|e| *e == ext) {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if best.as_ref().map(|(s, _)| size > *s).unwrap_or(true) {
            best = Some((size, path.to_path_buf()));
        }
    }
    best.map(|(_, p)| p)
}

/// Remove a directory tree if it exists; errors are ignored.
pub fn remove_dir_if_exists(path: &Path) {
    if path.is_dir() {
        let _ = fs::remove_dir_all(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_strips_punctuation() {
        assert_eq!(sanitize_filename("T2: Judgment Day (3D)"), "T2 Judgment Day 3D");
        assert_eq!(sanitize_filename("plain_name-1"), "plain_name-1");
    }

    #[test]
    fn normalized_existence_matches_spacing_variants() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("My Movie_AVP.mov"), b"x").unwrap();

        assert!(file_exists_normalized(&dir.path().join("My_Movie_AVP.mov")));
        assert!(file_exists_normalized(&dir.path().join("my movie_avp.mov")));
        assert!(!file_exists_normalized(&dir.path().join("Other_AVP.mov")));
    }

    #[test]
    fn largest_file_is_selected_recursively() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("small.mkv"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("sub/large.mkv"), vec![0u8; 1000]).unwrap();
        fs::write(dir.path().join("huge.txt"), vec![0u8; 5000]).unwrap();

        let found = find_largest_file_with_extensions(dir.path(), &["mkv"]).unwrap();
        assert_eq!(found.file_name().unwrap(), "large.mkv");
    }

    #[test]
    fn largest_file_none_when_no_match() {
        let dir = TempDir::new().unwrap();
        assert!(find_largest_file_with_extensions(dir.path(), &["mkv"]).is_none());
    }
}

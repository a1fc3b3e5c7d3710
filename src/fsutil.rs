//! Small filesystem utilities.

use globset::{Glob, GlobMatcher};

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{ProflowError, ProflowResult};

/// Lists files directly inside `dir` whose file name matches `pattern`,
/// sorted by path. A missing directory has no matches.
pub fn find_matching_files(dir: &Path, pattern: &str) -> ProflowResult<Vec<PathBuf>> {
    let matcher = compile_glob(pattern)?;
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            ProflowError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            out.push(entry.path().to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

/// Removes every match of `pattern` in `dir` and returns what was removed.
/// Nothing to remove is success, and so is a file disappearing between the
/// listing and the removal.
pub fn remove_matching_files(dir: &Path, pattern: &str) -> ProflowResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in find_matching_files(dir, pattern)? {
        match std::fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(removed)
}

/// Writes `bytes` to `path`, creating parent directories as needed.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> ProflowResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn compile_glob(pattern: &str) -> ProflowResult<GlobMatcher> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| ProflowError::InvalidArgument(format!("invalid glob {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("proflow-fsutil-{name}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn matches_only_top_level_files() {
        let root = temp_dir("top-level");
        std::fs::write(root.join("cachegrind.out.2"), b"b").expect("write");
        std::fs::write(root.join("cachegrind.out.1"), b"a").expect("write");
        std::fs::write(root.join("perf.data"), b"c").expect("write");
        std::fs::create_dir_all(root.join("nested")).expect("mkdir nested");
        std::fs::write(root.join("nested").join("cachegrind.out.3"), b"d").expect("write");
        std::fs::create_dir_all(root.join("cachegrind.out.dir")).expect("mkdir lookalike");

        let found = find_matching_files(&root, "cachegrind.out.*").expect("find");
        assert_eq!(
            found,
            vec![root.join("cachegrind.out.1"), root.join("cachegrind.out.2")]
        );
    }

    #[test]
    fn missing_directory_has_no_matches() {
        let root = temp_dir("missing").join("absent");
        assert!(find_matching_files(&root, "*").expect("find").is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let root = temp_dir("invalid");
        let err = find_matching_files(&root, "a[").expect_err("invalid glob");
        assert!(matches!(err, ProflowError::InvalidArgument(_)));
    }

    #[test]
    fn remove_is_idempotent() {
        let root = temp_dir("remove");
        for i in 0..3 {
            std::fs::write(root.join(format!("cachegrind.out.{i}")), b"x").expect("write");
        }
        let removed = remove_matching_files(&root, "cachegrind.out.*").expect("remove");
        assert_eq!(removed.len(), 3);
        let removed = remove_matching_files(&root, "cachegrind.out.*").expect("remove again");
        assert!(removed.is_empty());
        assert!(find_matching_files(&root, "cachegrind.out.*").expect("find").is_empty());
    }
}

//! Locating the operator executable

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// File name suffix the operator executable is searched by
pub const DEFAULT_OPERATOR_EXECUTABLE: &str = "Operator.exe";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Operator not found, exactly one file named {executable} should exist in {}", dir.display())]
    NotFound { dir: PathBuf, executable: String },
    #[error("Found {} operator candidates in {}, exactly one is allowed", candidates.len(), dir.display())]
    Ambiguous { dir: PathBuf, candidates: Vec<PathBuf> },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Resolve the operator executable
///
/// An explicit path is used as-is when it exists. Otherwise `search_dir` is
/// walked recursively for files whose name ends with `executable`; exactly
/// one match is required.
pub fn locate_operator(
    explicit: Option<&Path>,
    search_dir: &Path,
    executable: &str,
) -> Result<PathBuf, DiscoveryError> {
    if let Some(path) = explicit {
        if path.is_file() {
            debug!(path = %path.display(), "Using configured operator path");
            return Ok(path.to_path_buf());
        }
        debug!(path = %path.display(), "Configured operator path does not exist, searching");
    }

    let mut candidates = Vec::new();
    if search_dir.is_dir() {
        collect_matches(search_dir, executable, &mut candidates)?;
    }
    candidates.sort();

    match candidates.len() {
        0 => Err(DiscoveryError::NotFound {
            dir: search_dir.to_path_buf(),
            executable: executable.to_string(),
        }),
        1 => {
            let path = candidates.remove(0);
            info!(path = %path.display(), "Found operator");
            Ok(path)
        }
        _ => Err(DiscoveryError::Ambiguous {
            dir: search_dir.to_path_buf(),
            candidates,
        }),
    }
}

fn collect_matches(dir: &Path, executable: &str, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_matches(&path, executable, out)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(executable))
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_wins() {
        let temp_dir = TempDir::new().unwrap();
        let explicit = temp_dir.path().join("custom.exe");
        std::fs::write(&explicit, b"").unwrap();

        let found = locate_operator(Some(&explicit), temp_dir.path(), "Operator.exe").unwrap();
        assert_eq!(found, explicit);
    }

    #[test]
    fn test_search_finds_single_match() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("BCI2000").join("prog");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("Operator.exe"), b"").unwrap();
        std::fs::write(nested.join("SignalGenerator.exe"), b"").unwrap();

        let missing = temp_dir.path().join("nope.exe");
        let found = locate_operator(Some(&missing), temp_dir.path(), "Operator.exe").unwrap();
        assert_eq!(found, nested.join("Operator.exe"));
    }

    #[test]
    fn test_zero_or_many_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = locate_operator(None, temp_dir.path(), "Operator.exe");
        assert!(matches!(result, Err(DiscoveryError::NotFound { .. })));

        std::fs::write(temp_dir.path().join("Operator.exe"), b"").unwrap();
        std::fs::create_dir_all(temp_dir.path().join("old")).unwrap();
        std::fs::write(temp_dir.path().join("old").join("OldOperator.exe"), b"").unwrap();

        let result = locate_operator(None, temp_dir.path(), "Operator.exe");
        match result {
            Err(DiscoveryError::Ambiguous { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("Expected Ambiguous, got {:?}", other),
        }
    }
}

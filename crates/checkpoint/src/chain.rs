//! crates/checkpoint/src/chain.rs
//!
//! Chain file I/O (`<output>/<domain>.cpt`, a JSON array of checkpoint
//! names) and the `<prefix>.<n>` naming grammar.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ChainIoError, CheckpointError, CheckpointResult};

/// Returns the chain file path for `domain` under `output_dir`.
#[must_use]
pub fn chain_path(output_dir: &Path, domain: &str) -> PathBuf {
    output_dir.join(format!("{domain}.cpt"))
}

/// Reads the chain file at `path`. A missing file is treated as an empty
/// chain, matching the source tool's "absent ⇒ empty chain" semantics;
/// any other I/O or JSON failure is fatal.
pub fn read_chain(path: &Path) -> CheckpointResult<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).map_err(|err| CheckpointError::ReadCheckpointsError {
            path: path.display().to_string(),
            source: ChainIoError::Json(err),
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(CheckpointError::ReadCheckpointsError {
            path: path.display().to_string(),
            source: ChainIoError::Io(err),
        }),
    }
}

/// Overwrites the chain file at `path` with `chain`, serialized as a JSON
/// array of strings.
pub fn write_chain(path: &Path, chain: &[String]) -> CheckpointResult<()> {
    let json = serde_json::to_string(chain).expect("Vec<String> always serializes");
    fs::write(path, json).map_err(|err| CheckpointError::SaveCheckpointError { path: path.display().to_string(), source: err })
}

/// Deletes the chain file at `path`. A missing file is not an error,
/// mirroring the absent-delete tolerance the source tool shows for `full`
/// mode.
pub fn delete_chain(path: &Path) -> CheckpointResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(CheckpointError::SaveCheckpointError { path: path.display().to_string(), source: err }),
    }
}

/// Parses a checkpoint name as `<prefix>.<n>`, returning `n` if `name`
/// matches exactly (prefix, then a literal `.`, then an all-digit
/// non-negative integer).
#[must_use]
pub fn parse_suffix(prefix: &str, name: &str) -> Option<u64> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('.')?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Returns `true` if `name` does not match `<prefix>.<n>`.
#[must_use]
pub fn is_foreign(prefix: &str, name: &str) -> bool {
    parse_suffix(prefix, name).is_none()
}

/// The next checkpoint name to assign: `<prefix>.0` if `chain` is empty,
/// otherwise `<prefix>.<max(n) + 1>`.
#[must_use]
pub fn next_name(prefix: &str, chain: &[String]) -> String {
    let max = chain.iter().filter_map(|name| parse_suffix(prefix, name)).max();
    match max {
        Some(n) => format!("{prefix}.{}", n + 1),
        None => format!("{prefix}.0"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_chain_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = chain_path(dir.path(), "web01");
        assert_eq!(read_chain(&path).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn round_trips_a_chain() {
        let dir = tempdir().unwrap();
        let path = chain_path(dir.path(), "web01");
        let chain = vec!["web01.0".to_string(), "web01.1".to_string()];
        write_chain(&path, &chain).unwrap();
        assert_eq!(read_chain(&path).unwrap(), chain);
    }

    #[test]
    fn invalid_json_is_fatal() {
        let dir = tempdir().unwrap();
        let path = chain_path(dir.path(), "web01");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(read_chain(&path), Err(CheckpointError::ReadCheckpointsError { .. })));
    }

    #[test]
    fn delete_missing_chain_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = chain_path(dir.path(), "web01");
        delete_chain(&path).unwrap();
    }

    #[test]
    fn parses_suffix_and_rejects_non_numeric() {
        assert_eq!(parse_suffix("web01", "web01.3"), Some(3));
        assert_eq!(parse_suffix("web01", "web01.x"), None);
        assert_eq!(parse_suffix("web01", "other.3"), None);
        assert_eq!(parse_suffix("web01", "web01."), None);
    }

    #[test]
    fn next_name_starts_at_zero_then_increments_on_the_max() {
        assert_eq!(next_name("web01", &[]), "web01.0");
        let chain = vec!["web01.0".to_string(), "web01.2".to_string()];
        assert_eq!(next_name("web01", &chain), "web01.3");
    }

    #[test]
    fn foreign_detection_ignores_matching_names() {
        assert!(!is_foreign("web01", "web01.4"));
        assert!(is_foreign("web01", "manual-snap"));
    }
}

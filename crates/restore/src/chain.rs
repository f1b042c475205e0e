//! crates/restore/src/chain.rs
//!
//! Discovers one disk's chain of stream files in a restore input
//! directory and orders them the way they must be replayed: the `full`/
//! `copy` base first, then `inc` files in ascending checkpoint order,
//! then any `diff` files in ascending epoch order.
//!
//! Each stream file's name carries an `ident` segment — the checkpoint
//! name for `full`/`inc`, the epoch for `diff`, the disk target itself for
//! `copy` — matching `backup::naming::stream_file_name`. [`ChainFiles`]
//! keeps the ident of the last file so callers can look up that file's
//! qcow sidecar (`<disk_target>.<ident>.qcow.json`).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RestoreError, RestoreResult};

/// One disk's discovered, chain-ordered stream files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFiles {
    /// Stream files in replay order: base first.
    pub files: Vec<PathBuf>,
    /// The `ident` segment of the last file's name, used to locate that
    /// file's qcow sidecar and domain configuration snapshot.
    pub latest_ident: String,
}

struct IncEntry {
    path: PathBuf,
    ident: String,
    suffix: u64,
}

struct DiffEntry {
    path: PathBuf,
    ident: String,
    epoch: u64,
}

fn numeric_suffix(ident: &str) -> u64 {
    ident.rsplit_once('.').map_or(ident, |(_, suffix)| suffix).parse().unwrap_or(0)
}

/// Locates and orders `disk_target`'s chain of stream files in
/// `input_dir`.
pub fn locate_chain(input_dir: &Path, disk_target: &str) -> RestoreResult<ChainFiles> {
    let full_name = format!("{disk_target}.full.data");
    let copy_name = format!("{disk_target}.copy.data");
    let inc_prefix = format!("{disk_target}.inc.");
    let diff_prefix = format!("{disk_target}.diff.");

    let mut base: Option<(PathBuf, String)> = None;
    let mut incs = Vec::new();
    let mut diffs = Vec::new();

    let entries = fs::read_dir(input_dir).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;
    for entry in entries {
        let entry = entry.map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else { continue };

        if name == full_name {
            if base.is_some() {
                return Err(RestoreError::AmbiguousBase { disk: disk_target.to_string(), input_dir: input_dir.display().to_string() });
            }
            base = Some((path, disk_target.to_string()));
        } else if name == copy_name {
            if base.is_some() {
                return Err(RestoreError::AmbiguousBase { disk: disk_target.to_string(), input_dir: input_dir.display().to_string() });
            }
            base = Some((path, disk_target.to_string()));
        } else if let Some(rest) = name.strip_prefix(&inc_prefix) {
            if let Some(ident) = rest.strip_suffix(".data") {
                incs.push(IncEntry { path: path.clone(), ident: ident.to_string(), suffix: numeric_suffix(ident) });
            }
        } else if let Some(rest) = name.strip_prefix(&diff_prefix) {
            if let Some(ident) = rest.strip_suffix(".data") {
                let epoch = ident.parse().unwrap_or(0);
                diffs.push(DiffEntry { path: path.clone(), ident: ident.to_string(), epoch });
            }
        }
    }

    let Some((base_path, mut latest_ident)) = base else {
        return Err(RestoreError::NoBaseFound { disk: disk_target.to_string(), input_dir: input_dir.display().to_string() });
    };

    incs.sort_by_key(|entry| entry.suffix);
    diffs.sort_by_key(|entry| entry.epoch);

    let mut files = vec![base_path];
    for entry in incs {
        latest_ident = entry.ident;
        files.push(entry.path);
    }
    for entry in diffs {
        latest_ident = entry.ident;
        files.push(entry.path);
    }

    Ok(ChainFiles { files, latest_ident })
}

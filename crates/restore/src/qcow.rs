//! crates/restore/src/qcow.rs
//!
//! Parses the `<disk_target>.<ident>.qcow.json` sidecar a qcow2 backup
//! writes alongside its stream file, recovering the format options the
//! restored image should be created with.

use std::path::Path;

use crate::error::{RestoreError, RestoreResult};
use crate::types::QcowOptions;

/// Builds the sidecar file name for `disk_target`/`ident`, matching
/// `backup::naming::qcow_sidecar_name`'s grammar.
#[must_use]
pub fn qcow_sidecar_name(disk_target: &str, ident: &str) -> String {
    format!("{disk_target}.{ident}.qcow.json")
}

fn str_field<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    path.iter().try_fold(value, |current, key| current.get(key)).and_then(serde_json::Value::as_str)
}

fn u64_field(value: &serde_json::Value, path: &[&str]) -> Option<u64> {
    path.iter().try_fold(value, |current, key| current.get(key)).and_then(serde_json::Value::as_u64)
}

fn bool_field(value: &serde_json::Value, path: &[&str]) -> Option<bool> {
    path.iter().try_fold(value, |current, key| current.get(key)).and_then(serde_json::Value::as_bool)
}

/// Reads and parses `input_dir/<disk_target>.<ident>.qcow.json`, if it
/// exists. A missing sidecar is not an error: raw disks and older backups
/// carry none, so the image creator falls back to format defaults.
pub fn read_qcow_options(input_dir: &Path, disk_target: &str, ident: &str) -> RestoreResult<Option<QcowOptions>> {
    let path = input_dir.join(qcow_sidecar_name(disk_target, ident));
    if !path.exists() {
        return Ok(None);
    }

    let text = std::fs::read_to_string(&path).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|err| RestoreError::Io { disk: disk_target.to_string(), source: std::io::Error::other(err) })?;

    Ok(Some(QcowOptions {
        compat: str_field(&value, &["format-specific", "data", "compat"]).map(str::to_string),
        cluster_size: u64_field(&value, &["cluster-size"]),
        lazy_refcounts: bool_field(&value, &["format-specific", "data", "lazy-refcounts"]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sidecar_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = read_qcow_options(dir.path(), "vda", "web01.0").unwrap();
        assert_eq!(options, None);
    }

    #[test]
    fn parses_compat_cluster_size_and_lazy_refcounts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vda.web01.0.qcow.json"),
            r#"{
                "cluster-size": 65536,
                "format-specific": {
                    "type": "qcow2",
                    "data": {
                        "compat": "1.1",
                        "lazy-refcounts": true
                    }
                }
            }"#,
        )
        .unwrap();

        let options = read_qcow_options(dir.path(), "vda", "web01.0").unwrap().unwrap();
        assert_eq!(options.compat.as_deref(), Some("1.1"));
        assert_eq!(options.cluster_size, Some(65536));
        assert_eq!(options.lazy_refcounts, Some(true));
    }
}

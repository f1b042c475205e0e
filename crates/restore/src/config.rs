//! crates/restore/src/config.rs
//!
//! Domain-level restore concerns that sit above the per-disk replay
//! pipeline: locating the `vmconfig.<ident>.xml` snapshot a backup run
//! wrote, and rewriting it to point at the restored disk paths (or drop
//! excluded disks) before an optional `hypervisor.define_domain` call.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use hypervisor::Hypervisor;

use crate::error::{RestoreError, RestoreResult};

/// The domain configuration snapshot file name, matching
/// `backup::naming::domain_config_name`'s grammar.
#[must_use]
pub fn domain_config_name(ident: &str) -> String {
    format!("vmconfig.{ident}.xml")
}

/// Locates the domain configuration snapshot written for `ident`
/// (typically the last-applied chain file's ident) in `input_dir`. Falls
/// back to whatever single `vmconfig.*.xml` file exists when no exact
/// match is found, since older backups without per-run idents wrote a
/// single snapshot per domain.
pub fn locate_domain_config(input_dir: &Path, ident: &str) -> RestoreResult<PathBuf> {
    let exact = input_dir.join(domain_config_name(ident));
    if exact.exists() {
        return Ok(exact);
    }

    let mut candidates = Vec::new();
    let entries = fs::read_dir(input_dir).map_err(|source| RestoreError::Io { disk: input_dir.display().to_string(), source })?;
    for entry in entries {
        let entry = entry.map_err(|source| RestoreError::Io { disk: input_dir.display().to_string(), source })?;
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            if name.starts_with("vmconfig.") && name.ends_with(".xml") {
                candidates.push(path);
            }
        }
    }
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| RestoreError::NoDomainConfigFound(input_dir.display().to_string()))
}

/// Reads the domain configuration XML located by [`locate_domain_config`].
pub fn read_domain_config(path: &Path) -> RestoreResult<String> {
    fs::read_to_string(path).map_err(|source| RestoreError::Io { disk: path.display().to_string(), source })
}

/// Rewrites `xml` so every disk in `disk_paths` points at its restored
/// path, and removes any disk named in `excluded_disks`.
pub fn adjust_domain_config(
    hypervisor: &dyn Hypervisor,
    xml: &str,
    disk_paths: &HashMap<String, PathBuf>,
    excluded_disks: &[String],
) -> RestoreResult<String> {
    let mut adjusted = hypervisor.adjust_domain_config(xml, disk_paths)?;
    for disk_target in excluded_disks {
        adjusted = hypervisor.adjust_domain_config_remove_disk(&adjusted, disk_target)?;
    }
    Ok(adjusted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_exact_ident_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vmconfig.web01.0.xml"), "<domain/>").unwrap();

        let path = locate_domain_config(dir.path(), "web01.0").unwrap();
        assert_eq!(path.file_name().unwrap(), "vmconfig.web01.0.xml");
    }

    #[test]
    fn falls_back_to_any_vmconfig_file_when_ident_does_not_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vmconfig.web01.0.xml"), "<domain/>").unwrap();

        let path = locate_domain_config(dir.path(), "web01.5").unwrap();
        assert_eq!(path.file_name().unwrap(), "vmconfig.web01.0.xml");
    }

    #[test]
    fn missing_domain_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_domain_config(dir.path(), "web01.0").unwrap_err();
        assert!(matches!(err, RestoreError::NoDomainConfigFound(_)));
    }

    #[test]
    fn adjusts_then_removes_excluded_disks() {
        const XML: &str = r#"<domain type='kvm'>
  <devices>
    <disk type='file' device='disk'>
      <source file='/orig/vda.qcow2'/>
      <target dev='vda' bus='virtio'/>
    </disk>
    <disk type='file' device='disk'>
      <source file='/orig/vdb.qcow2'/>
      <target dev='vdb' bus='virtio'/>
    </disk>
  </devices>
</domain>"#;

        let hv = hypervisor::FakeHypervisor::new();
        hv.add_domain(
            "web01",
            vec![hypervisor::DiskSpec { target: "vda".into(), format: "qcow2".into(), source_path: "/orig/vda.qcow2".into() }],
            XML,
        );
        let xml = hv.get_domain_config("web01").unwrap();

        let mut disk_paths = HashMap::new();
        disk_paths.insert("vda".to_string(), PathBuf::from("/restored/vda.qcow2"));

        let adjusted = adjust_domain_config(&hv, &xml, &disk_paths, &["vdb".to_string()]).unwrap();
        assert!(adjusted.contains("/restored/vda.qcow2"));
        assert!(!adjusted.contains("vdb"));
    }
}

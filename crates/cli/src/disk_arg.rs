//! crates/cli/src/disk_arg.rs
//!
//! `--disk TARGET=PATH[:FORMAT]`: the only way this workspace's CLI front
//! end can tell the in-memory hypervisor fake what a domain's disks are,
//! since no real libvirt client ships here.

use std::path::PathBuf;
use std::str::FromStr;

use hypervisor::DiskSpec;

/// One `--disk` argument, already split into its target/path/format parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskArg {
    /// The hypervisor disk target name (e.g. `vda`).
    pub target: String,
    /// The disk image path.
    pub path: PathBuf,
    /// The disk image format; defaults to `qcow2` when not given.
    pub format: String,
}

/// A `--disk` value that did not match `TARGET=PATH[:FORMAT]`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid --disk value {0:?}: expected TARGET=PATH[:FORMAT]")]
pub struct DiskArgError(String);

impl FromStr for DiskArg {
    type Err = DiskArgError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (target, rest) = value.split_once('=').ok_or_else(|| DiskArgError(value.to_string()))?;
        if target.is_empty() || rest.is_empty() {
            return Err(DiskArgError(value.to_string()));
        }
        let (path, format) = match rest.rsplit_once(':') {
            Some((path, format)) if !path.is_empty() && !format.is_empty() => (path, format.to_string()),
            _ => (rest, "qcow2".to_string()),
        };
        Ok(Self { target: target.to_string(), path: PathBuf::from(path), format })
    }
}

/// Converts parsed `--disk` arguments into the `DiskSpec` list a domain is
/// registered with.
#[must_use]
pub fn to_disk_specs(args: &[DiskArg]) -> Vec<DiskSpec> {
    args.iter().map(|arg| DiskSpec { target: arg.target.clone(), format: arg.format.clone(), source_path: arg.path.clone() }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_target_path_and_format() {
        let arg: DiskArg = "vda=/images/web01-vda.img:raw".parse().unwrap();
        assert_eq!(arg.target, "vda");
        assert_eq!(arg.path, PathBuf::from("/images/web01-vda.img"));
        assert_eq!(arg.format, "raw");
    }

    #[test]
    fn defaults_format_to_qcow2_when_omitted() {
        let arg: DiskArg = "vda=/images/web01-vda.qcow2".parse().unwrap();
        assert_eq!(arg.format, "qcow2");
    }

    #[test]
    fn rejects_a_value_with_no_equals_sign() {
        assert!("vda".parse::<DiskArg>().is_err());
    }

    #[test]
    fn rejects_an_empty_target_or_path() {
        assert!("=/images/vda.img".parse::<DiskArg>().is_err());
        assert!("vda=".parse::<DiskArg>().is_err());
    }
}

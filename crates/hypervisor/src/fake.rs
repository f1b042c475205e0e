//! crates/hypervisor/src/fake.rs
//!
//! [`FakeHypervisor`]: an in-memory [`Hypervisor`] used by every other
//! crate's test suite (and re-exported through `test_support`). It performs
//! no actual libvirt calls; state lives in a [`Mutex`] so the fake can be
//! shared across the orchestrator's worker threads exactly like a real
//! client handle would be.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{HypervisorError, HypervisorResult};
use crate::trait_def::Hypervisor;
use crate::types::{BackupJobHandle, BackupJobSpec, DiskSpec, DomainInfo};

struct DomainRecord {
    disks: Vec<DiskSpec>,
    config_xml: String,
    nvram: Option<PathBuf>,
    kernel: Option<PathBuf>,
    loader: Option<PathBuf>,
    checkpoints: Vec<String>,
    job_active: bool,
}

/// An in-memory [`Hypervisor`] fake for tests.
///
/// Register domains with [`FakeHypervisor::add_domain`], and configure the
/// NBD endpoints a subsequent [`Hypervisor::start_backup`] call should hand
/// back with [`FakeHypervisor::set_backup_endpoints`].
pub struct FakeHypervisor {
    domains: Mutex<HashMap<String, DomainRecord>>,
    next_endpoints: Mutex<HashMap<String, nbd_transport::NbdEndpoint>>,
    defined: Mutex<Vec<String>>,
}

impl Default for FakeHypervisor {
    fn default() -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
            next_endpoints: Mutex::new(HashMap::new()),
            defined: Mutex::new(Vec::new()),
        }
    }
}

impl FakeHypervisor {
    /// Creates an empty fake with no registered domains.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a domain with the given disks and config XML.
    pub fn add_domain(&self, name: &str, disks: Vec<DiskSpec>, config_xml: impl Into<String>) {
        let mut domains = self.domains.lock().expect("fake hypervisor mutex poisoned");
        domains.insert(
            name.to_string(),
            DomainRecord {
                disks,
                config_xml: config_xml.into(),
                nvram: None,
                kernel: None,
                loader: None,
                checkpoints: Vec::new(),
                job_active: false,
            },
        );
    }

    /// Sets the boot-aux paths (UEFI NVRAM, kernel, loader) an already
    /// registered domain reports.
    pub fn set_boot_aux(&self, name: &str, nvram: Option<PathBuf>, kernel: Option<PathBuf>, loader: Option<PathBuf>) {
        let mut domains = self.domains.lock().expect("fake hypervisor mutex poisoned");
        if let Some(record) = domains.get_mut(name) {
            record.nvram = nvram;
            record.kernel = kernel;
            record.loader = loader;
        }
    }

    /// Injects a foreign (non-`prefix.<n>`) checkpoint at the hypervisor for
    /// `name`, simulating a checkpoint this tool did not create.
    pub fn inject_foreign_checkpoint(&self, name: &str, checkpoint: &str) {
        let mut domains = self.domains.lock().expect("fake hypervisor mutex poisoned");
        if let Some(record) = domains.get_mut(name) {
            record.checkpoints.push(checkpoint.to_string());
        }
    }

    /// Configures the endpoints the next [`Hypervisor::start_backup`] call
    /// returns.
    pub fn set_backup_endpoints(&self, endpoints: HashMap<String, nbd_transport::NbdEndpoint>) {
        *self.next_endpoints.lock().expect("fake hypervisor mutex poisoned") = endpoints;
    }

    /// The domain names `define_domain` was called with, in call order.
    #[must_use]
    pub fn defined_domains(&self) -> Vec<String> {
        self.defined.lock().expect("fake hypervisor mutex poisoned").clone()
    }

    fn with_domain<T>(&self, name: &str, f: impl FnOnce(&mut DomainRecord) -> HypervisorResult<T>) -> HypervisorResult<T> {
        let mut domains = self.domains.lock().expect("fake hypervisor mutex poisoned");
        let record = domains
            .get_mut(name)
            .ok_or_else(|| HypervisorError::DomainNotFound(name.to_string()))?;
        f(record)
    }
}

impl Hypervisor for FakeHypervisor {
    fn get_domain(&self, name: &str) -> HypervisorResult<DomainInfo> {
        self.with_domain(name, |record| {
            Ok(DomainInfo {
                name: name.to_string(),
                disks: record.disks.clone(),
                nvram: record.nvram.clone(),
                kernel: record.kernel.clone(),
                loader: record.loader.clone(),
            })
        })
    }

    fn get_domain_disks(&self, name: &str) -> HypervisorResult<Vec<DiskSpec>> {
        self.with_domain(name, |record| Ok(record.disks.clone()))
    }

    fn get_domain_config(&self, name: &str) -> HypervisorResult<String> {
        self.with_domain(name, |record| Ok(record.config_xml.clone()))
    }

    fn start_backup(&self, name: &str, _spec: &BackupJobSpec<'_>) -> HypervisorResult<BackupJobHandle> {
        self.with_domain(name, |record| {
            if record.job_active {
                return Err(HypervisorError::JobAlreadyActive(name.to_string()));
            }
            record.job_active = true;
            Ok(())
        })?;
        let endpoints = self.next_endpoints.lock().expect("fake hypervisor mutex poisoned").clone();
        Ok(BackupJobHandle { endpoints })
    }

    fn stop_backup(&self, name: &str) -> HypervisorResult<()> {
        self.with_domain(name, |record| {
            if !record.job_active {
                return Err(HypervisorError::NoActiveJob(name.to_string()));
            }
            record.job_active = false;
            Ok(())
        })
    }

    fn backup_checkpoint(&self, name: &str, checkpoint: &str, _parent: &str) -> HypervisorResult<()> {
        self.with_domain(name, |record| {
            if !record.checkpoints.iter().any(|c| c == checkpoint) {
                record.checkpoints.push(checkpoint.to_string());
            }
            Ok(())
        })
    }

    fn has_foreign_checkpoint(&self, name: &str, prefix: &str) -> HypervisorResult<Option<String>> {
        self.with_domain(name, |record| {
            let expected = format!("{prefix}.");
            Ok(record
                .checkpoints
                .iter()
                .find(|cpt| {
                    !cpt.strip_prefix(&expected)
                        .is_some_and(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
                })
                .cloned())
        })
    }

    fn remove_all_checkpoints(&self, name: &str) -> HypervisorResult<()> {
        self.with_domain(name, |record| {
            record.checkpoints.clear();
            Ok(())
        })
    }

    fn redefine_checkpoints(&self, name: &str, checkpoints: &[String]) -> HypervisorResult<()> {
        self.with_domain(name, |record| {
            for cpt in checkpoints {
                if !record.checkpoints.iter().any(|existing| existing == cpt) {
                    record.checkpoints.push(cpt.clone());
                }
            }
            Ok(())
        })
    }

    fn define_domain(&self, xml: &str) -> HypervisorResult<()> {
        self.defined.lock().expect("fake hypervisor mutex poisoned").push(xml.to_string());
        Ok(())
    }

    fn adjust_domain_config(&self, xml: &str, disk_paths: &HashMap<String, PathBuf>) -> HypervisorResult<String> {
        let mut out = xml.to_string();
        for (target, path) in disk_paths {
            out = crate::xml::rewrite_disk_source(&out, target, &path.to_string_lossy());
        }
        Ok(out)
    }

    fn adjust_domain_config_remove_disk(&self, xml: &str, disk_target: &str) -> HypervisorResult<String> {
        Ok(crate::xml::remove_disk(xml, disk_target))
    }

    fn refresh_pool(&self, _pool: &str) -> HypervisorResult<()> {
        Ok(())
    }
}

//! crates/orchestrator/src/restore_run.rs
//!
//! `run_restore`: the whole-domain restore entry point. Discovers each
//! selected disk's chain, fans disks out across a static round-robin
//! partition of worker threads, and optionally rewrites/defines the
//! domain configuration snapshot once every worker reports back.
//!
//! A base file produced by a raw-passthrough backup carries no frame
//! container at all ([`backup::types::StreamType::Raw`]), so it cannot be
//! sniffed for a leading Meta frame the way a framed stream file can.
//! [`restore_one_disk`] tries [`restore::dump::peek_metadata`] on the
//! chain's base file first; a [`restore::error::RestoreError::Stream`]
//! failure there falls back to copying the base file verbatim as the
//! target image, skipping the NBD replay pipeline entirely. Any further
//! chain files past that base are only meaningful for a framed stream, so
//! they are reported as skipped rather than silently dropped.

use std::collections::HashMap;
use std::fs;

use hypervisor::Hypervisor;
use restore::chain::{locate_chain, ChainFiles};
use restore::config::{adjust_domain_config, domain_config_name, locate_domain_config, read_domain_config};
use restore::dump::peek_metadata;
use restore::error::RestoreError;
use restore::image::ImageCreator;
use restore::nbd_server::NbdServerLauncher;
use restore::qcow::read_qcow_options;
use restore::types::{RestoreDiskRequest, RestoreEndpoint, RestoreOutcome};

use crate::cancel::CancellationToken;
use crate::config::{RestoreRunConfig, RestoreTransportMode};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::ports::PortAllocator;
use crate::select::select_disks;

/// What one restore run produced.
pub struct RestoreRunSummary {
    /// Successful per-disk outcomes, in worker-completion order.
    pub outcomes: Vec<RestoreOutcome>,
    /// Per-disk failures; other disks still complete.
    pub failures: Vec<(String, RestoreError)>,
    /// Whether `define_domain` was called.
    pub defined: bool,
    /// Whether the run was cut short by an interrupt.
    pub cancelled: bool,
}

/// Every disk target with at least one stream file in `input_dir`,
/// discovered by scanning for `<target>.full.data`/`<target>.copy.data`
/// base names.
fn discover_disks(input_dir: &std::path::Path) -> OrchestratorResult<Vec<String>> {
    let mut targets = Vec::new();
    let entries = fs::read_dir(input_dir).map_err(|source| OrchestratorError::Io { path: input_dir.display().to_string(), source })?;
    for entry in entries {
        let entry = entry.map_err(|source| OrchestratorError::Io { path: input_dir.display().to_string(), source })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else { continue };
        for suffix in [".full.data", ".copy.data"] {
            if let Some(target) = name.strip_suffix(suffix) {
                if !targets.contains(&target.to_string()) {
                    targets.push(target.to_string());
                }
            }
        }
    }
    targets.sort();
    Ok(targets)
}

/// Copies the chain's base file verbatim to `target_path`, for a
/// raw-passthrough backup with no frame container to replay. Any chain
/// file beyond the base is reported as skipped, since layering further
/// raw-passthrough updates would require the per-extent bookkeeping only
/// the framed stream carries.
fn copy_raw_passthrough(chain: &ChainFiles, disk_target: &str, target_path: &std::path::Path) -> Result<RestoreOutcome, RestoreError> {
    if target_path.exists() {
        return Err(RestoreError::TargetExists { path: target_path.display().to_string() });
    }
    let base = &chain.files[0];
    fs::copy(base, target_path).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;
    if chain.files.len() > 1 {
        logging::warn_log!(
            "disk {disk_target}: {} additional chain file(s) beyond the raw passthrough base were not applied",
            chain.files.len() - 1
        );
    }
    let restored_bytes = fs::metadata(target_path).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?.len();
    Ok(RestoreOutcome { disk_target: disk_target.to_string(), restored_bytes, files_applied: 1, stopped_at: None })
}

/// Restores one disk: locates its chain, and either replays it through
/// the framed pipeline or, for a raw-passthrough base, copies it directly.
fn restore_one_disk(
    config: &RestoreRunConfig,
    disk_target: &str,
    worker_index: usize,
    launcher: &dyn NbdServerLauncher,
    image_creator: &dyn ImageCreator,
    ports: Option<&[u16]>,
) -> Result<(RestoreOutcome, String), RestoreError> {
    let chain = locate_chain(&config.input_dir, disk_target)?;
    let target_path = config.output_dir.join(format!("{disk_target}.img"));

    let metadata = match peek_metadata(&chain.files[0]) {
        Ok(metadata) => metadata,
        Err(RestoreError::Stream { .. }) => {
            let outcome = copy_raw_passthrough(&chain, disk_target, &target_path)?;
            return Ok((outcome, chain.latest_ident));
        }
        Err(other) => return Err(other),
    };

    let qcow_options = read_qcow_options(&config.input_dir, disk_target, &chain.latest_ident)?;
    let endpoint = match &config.transport {
        RestoreTransportMode::Local { socket_dir } => {
            RestoreEndpoint::Local { launcher, socket_path: socket_dir.join(format!("{disk_target}.sock")) }
        }
        RestoreTransportMode::Remote { .. } => {
            let ports = ports.expect("remote restore transport always computes a port table");
            RestoreEndpoint::Remote { launcher, port: ports[worker_index % ports.len()] }
        }
    };

    let request = RestoreDiskRequest {
        disk_target,
        chain_files: &chain.files,
        target_path: &target_path,
        disk_format: &metadata.disk_format,
        qcow_options: qcow_options.as_ref(),
        virtual_size: metadata.virtual_size,
        endpoint,
        until: config.until.as_deref(),
    };

    let outcome = restore::restore_disk(&request, image_creator)?;
    Ok((outcome, chain.latest_ident))
}

/// Runs a full restore of every selected disk in `config.input_dir` into
/// `config.output_dir`, optionally rewriting and defining the domain
/// configuration snapshot once every disk has been restored.
pub fn run_restore(
    config: &RestoreRunConfig,
    hypervisor: &dyn Hypervisor,
    launcher: &dyn NbdServerLauncher,
    image_creator: &dyn ImageCreator,
    cancel: &CancellationToken,
) -> OrchestratorResult<RestoreRunSummary> {
    let available = discover_disks(&config.input_dir)?;
    let selected = select_disks(&available, &config.disk_filter, &[]);
    if selected.is_empty() {
        return Err(OrchestratorError::NoDisksSelected { domain: config.input_dir.display().to_string() });
    }
    let excluded: Vec<String> = available.iter().filter(|target| !selected.contains(target)).cloned().collect();

    let worker_count = config.worker_count.clamp(1, selected.len());
    let ports = match &config.transport {
        RestoreTransportMode::Remote { base_port } => Some(PortAllocator::new(*base_port).disjoint(worker_count)?),
        RestoreTransportMode::Local { .. } => None,
    };

    let (tx, rx) = crossbeam_channel::unbounded::<Result<(RestoreOutcome, String), (String, RestoreError)>>();

    let (outcomes, failures, idents) = std::thread::scope(|scope| {
        for worker_index in 0..worker_count {
            let tx = tx.clone();
            let ports = ports.as_deref();
            let cancel = cancel.handle();
            let selected = &selected;
            scope.spawn(move || {
                for (disk_index, disk_target) in selected.iter().enumerate() {
                    if disk_index % worker_count != worker_index {
                        continue;
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                    let result =
                        restore_one_disk(config, disk_target, worker_index, launcher, image_creator, ports).map_err(|err| (disk_target.clone(), err));
                    let _ = tx.send(result);
                }
            });
        }
        drop(tx);

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        let mut idents = Vec::new();
        for result in rx.iter() {
            match result {
                Ok((outcome, ident)) => {
                    idents.push(ident);
                    outcomes.push(outcome);
                }
                Err((disk, err)) => failures.push((disk, err)),
            }
        }
        (outcomes, failures, idents)
    });

    let cancelled = cancel.is_cancelled();
    let mut defined = false;

    if failures.is_empty() && !cancelled && !idents.is_empty() {
        let ident = idents.first().cloned().unwrap_or_default();
        let to_orchestrator_err = |source: RestoreError| OrchestratorError::Restore { disk: ident.clone(), source };
        let config_path = locate_domain_config(&config.input_dir, &ident).map_err(to_orchestrator_err)?;
        let mut xml = read_domain_config(&config_path).map_err(to_orchestrator_err)?;

        if config.adjust_config {
            let mut disk_paths = HashMap::new();
            for outcome in &outcomes {
                disk_paths.insert(outcome.disk_target.clone(), config.output_dir.join(format!("{}.img", outcome.disk_target)));
            }
            xml = adjust_domain_config(hypervisor, &xml, &disk_paths, &excluded).map_err(to_orchestrator_err)?;
        }

        let persisted_name = domain_config_name(&ident);
        fs::write(config.output_dir.join(&persisted_name), &xml).map_err(|source| OrchestratorError::Io { path: persisted_name, source })?;

        if config.define {
            hypervisor.define_domain(&xml)?;
            defined = true;
        }
    }

    if cancelled {
        logging::warn_log!("restore into {} cancelled before every disk completed", config.output_dir.display());
    }

    Ok(RestoreRunSummary { outcomes, failures, defined, cancelled })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_disks_finds_full_and_copy_bases() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vda.full.data"), b"").unwrap();
        fs::write(dir.path().join("vdb.copy.data"), b"").unwrap();
        fs::write(dir.path().join("vda.inc.web01.1.data"), b"").unwrap();

        let targets = discover_disks(dir.path()).unwrap();
        assert_eq!(targets, vec!["vda".to_string(), "vdb".to_string()]);
    }

    #[test]
    fn no_disks_discovered_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let targets = discover_disks(dir.path()).unwrap();
        assert!(targets.is_empty());
    }
}

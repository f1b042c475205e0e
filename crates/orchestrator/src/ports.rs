//! crates/orchestrator/src/ports.rs
//!
//! [`PortAllocator`]: assigns the disjoint TCP ports an offline-remote
//! backup's per-disk NBD servers listen on — port
//! overlap between two concurrent workers corrupts both backups, so this
//! is validated once, before any worker starts, rather than left to each
//! worker to discover at bind time.

use crate::error::{OrchestratorError, OrchestratorResult};

/// Assigns `base_port + worker_index` to each of `worker_count` workers.
pub struct PortAllocator {
    base_port: u16,
}

impl PortAllocator {
    /// Builds an allocator starting at `base_port`.
    #[must_use]
    pub const fn new(base_port: u16) -> Self {
        Self { base_port }
    }

    /// The port assigned to `worker_index`.
    #[must_use]
    pub fn port_for(&self, worker_index: usize) -> Option<u16> {
        u16::try_from(worker_index).ok().and_then(|index| self.base_port.checked_add(index))
    }

    /// Computes and validates the full `worker_count`-long port assignment,
    /// failing with [`OrchestratorError::PortRangeExhausted`] if the range
    /// would overflow `u16` before every worker gets a port.
    ///
    /// The resulting ports are always mutually disjoint by construction
    /// (`base_port + i` for distinct `i` in `0..worker_count`, each
    /// `checked_add`ed independently), but the assignment is validated as a
    /// whole here so a caller gets one clear error up front instead of a
    /// worker discovering an address-in-use failure mid-run.
    pub fn disjoint(&self, worker_count: usize) -> OrchestratorResult<Vec<u16>> {
        let mut ports = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let port = self.port_for(worker_index).ok_or(OrchestratorError::PortRangeExhausted {
                worker_count,
                base_port: self.base_port,
            })?;
            ports.push(port);
        }
        Ok(ports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_sequential_ports_from_base() {
        let allocator = PortAllocator::new(10_809);
        let ports = allocator.disjoint(3).unwrap();
        assert_eq!(ports, vec![10_809, 10_810, 10_811]);
    }

    #[test]
    fn single_worker_gets_the_base_port() {
        let allocator = PortAllocator::new(10_809);
        assert_eq!(allocator.disjoint(1).unwrap(), vec![10_809]);
    }

    #[test]
    fn overflow_past_u16_max_is_rejected() {
        let allocator = PortAllocator::new(65_534);
        let err = allocator.disjoint(4).unwrap_err();
        assert!(matches!(err, OrchestratorError::PortRangeExhausted { .. }));
    }

    #[test]
    fn ports_are_pairwise_disjoint() {
        let allocator = PortAllocator::new(20_000);
        let ports = allocator.disjoint(8).unwrap();
        let mut sorted = ports.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ports.len());
    }
}

//! crates/orchestrator/src/select.rs
//!
//! Disk include/exclude filtering shared by both the backup and restore
//! run paths.

/// Applies `include` then `exclude` to `available`, preserving
/// `available`'s order.
///
/// An empty `include` means "every available disk". `exclude` is applied
/// after inclusion, so a target named in both lists is dropped.
#[must_use]
pub fn select_disks(available: &[String], include: &[String], exclude: &[String]) -> Vec<String> {
    available
        .iter()
        .filter(|target| include.is_empty() || include.iter().any(|wanted| *wanted == **target))
        .filter(|target| !exclude.iter().any(|unwanted| *unwanted == **target))
        .cloned()
        .collect()
}

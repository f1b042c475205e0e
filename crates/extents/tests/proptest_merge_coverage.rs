//! Property-based tests for extent merging and coverage validation.

use extents::{cover_disk, merge_adjacent, Extent};
use proptest::prelude::*;

/// Builds a contiguous, gapless run of extents covering `[0, sum(lengths))`,
/// alternating the `data` flag by parity of index so adjacent runs may or
/// may not share a flag depending on the generated lengths.
fn contiguous_extents(lengths: &[u64], flags: &[bool]) -> Vec<Extent> {
    let mut offset = 0u64;
    let mut extents = Vec::with_capacity(lengths.len());
    for (length, data) in lengths.iter().zip(flags.iter()) {
        extents.push(Extent { offset, length: *length, data: *data });
        offset += length;
    }
    extents
}

proptest! {
    /// Merging a contiguous, gapless sequence always yields a sequence that
    /// still covers the same disk size, with no two adjacent extents
    /// sharing a `data` flag.
    #[test]
    fn merge_preserves_coverage_and_collapses_adjacent_flags(
        lengths in prop::collection::vec(1u64..4096, 1..30),
        flags in prop::collection::vec(any::<bool>(), 1..30),
    ) {
        let len = lengths.len().min(flags.len());
        let lengths = &lengths[..len];
        let flags = &flags[..len];
        let disk_size: u64 = lengths.iter().sum();

        let extents = contiguous_extents(lengths, flags);
        let merged = merge_adjacent(extents);

        prop_assert!(cover_disk(&merged, disk_size).is_ok());
        for pair in merged.windows(2) {
            prop_assert_ne!(pair[0].data, pair[1].data);
        }
    }

    /// Merging never changes the total covered length, whether or not the
    /// run is contiguous.
    #[test]
    fn merge_never_changes_total_length(
        lengths in prop::collection::vec(1u64..4096, 1..30),
        flags in prop::collection::vec(any::<bool>(), 1..30),
    ) {
        let len = lengths.len().min(flags.len());
        let lengths = &lengths[..len];
        let flags = &flags[..len];

        let extents = contiguous_extents(lengths, flags);
        let total_before: u64 = extents.iter().map(|e| e.length).sum();
        let merged = merge_adjacent(extents);
        let total_after: u64 = merged.iter().map(|e| e.length).sum();
        prop_assert_eq!(total_before, total_after);
    }
}

//! Property-based tests for checkpoint chain naming monotonicity.

use checkpoint::{is_foreign, next_name, parse_suffix};
use proptest::prelude::*;

proptest! {
    /// Extending a chain with `next_name`'s result always produces a suffix
    /// strictly greater than every suffix already in the chain.
    #[test]
    fn next_name_exceeds_every_existing_suffix(suffixes in prop::collection::vec(0u64..10_000, 0..20)) {
        let prefix = "web01";
        let chain: Vec<String> = suffixes.iter().map(|n| format!("{prefix}.{n}")).collect();

        let assigned = next_name(prefix, &chain);
        let assigned_suffix = parse_suffix(prefix, &assigned).expect("assigned name matches the chain grammar");

        for suffix in &suffixes {
            prop_assert!(assigned_suffix > *suffix);
        }
        prop_assert!(!is_foreign(prefix, &assigned));
    }

    /// Repeatedly appending `next_name`'s result to the chain always
    /// produces a strictly increasing sequence of suffixes.
    #[test]
    fn repeated_extension_is_strictly_increasing(rounds in 1usize..20) {
        let prefix = "web01";
        let mut chain: Vec<String> = Vec::new();
        let mut last_suffix: Option<u64> = None;

        for _ in 0..rounds {
            let name = next_name(prefix, &chain);
            let suffix = parse_suffix(prefix, &name).expect("assigned name matches the chain grammar");
            if let Some(last) = last_suffix {
                prop_assert!(suffix > last);
            }
            last_suffix = Some(suffix);
            chain.push(name);
        }
    }
}

//! Property-based tests for tree build and query
//!
//! Uses proptest to check lookups and scans against a `BTreeMap` model across
//! many random key sets and node sizes.

use dictree::core::{build_to_vec, Container};
use dictree::{BuildConfig, CompressionMethod, Metadata, ReaderConfig, TrailerLayout};
use proptest::prelude::*;
use std::collections::BTreeMap;

type Model = BTreeMap<Vec<u8>, Vec<u8>>;

/// Keys over a tiny alphabet so prefixes collide often
fn model() -> impl Strategy<Value = Model> {
    prop::collection::btree_map(
        prop::collection::vec(0u8..4, 0..8),
        prop::collection::vec(any::<u8>(), 0..24),
        0..300,
    )
}

fn config() -> impl Strategy<Value = BuildConfig> {
    (1usize..8, 2usize..6, 16usize..512, prop::bool::ANY).prop_map(
        |(leaf_entries, fan_out, leaf_bytes, compress)| BuildConfig {
            leaf_max_bytes: leaf_bytes,
            leaf_max_entries: leaf_entries,
            internal_max_entries: fan_out,
            compression: if compress {
                CompressionMethod::Deflate
            } else {
                CompressionMethod::None
            },
            ..BuildConfig::default()
        },
    )
}

fn open(model: &Model, config: &BuildConfig) -> Container<Vec<u8>> {
    let bytes = build_to_vec(
        TrailerLayout::Single,
        &Metadata::new(),
        config,
        model.iter().map(|(k, v)| (k.clone(), v.clone())),
    )
    .unwrap();
    Container::from_source(bytes, &ReaderConfig::default()).unwrap()
}

proptest! {
    #[test]
    fn prop_lookup_matches_model(
        model in model(),
        config in config(),
        candidates in prop::collection::vec(prop::collection::vec(0u8..5, 0..9), 0..50)
    ) {
        let container = open(&model, &config);
        let tree = container.entries();

        for (key, value) in &model {
            let found = tree.lookup(key).unwrap();
            prop_assert_eq!(found.as_ref(), Some(value));
        }
        for candidate in &candidates {
            let found = tree.lookup(candidate).unwrap();
            prop_assert_eq!(found.as_ref(), model.get(candidate));
        }
    }

    #[test]
    fn prop_iter_is_sorted_model(model in model(), config in config()) {
        let container = open(&model, &config);
        let tree = container.entries();

        let all: Vec<(Vec<u8>, Vec<u8>)> = tree.iter().map(|e| e.unwrap()).collect();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = model.clone().into_iter().collect();
        prop_assert_eq!(all, expected);

        let (leaves, entries) = tree.leaf_chain_stats().unwrap();
        prop_assert_eq!(entries, model.len() as u64);
        prop_assert!(leaves >= 1);
    }

    #[test]
    fn prop_scan_is_exact(
        model in model(),
        config in config(),
        prefix in prop::collection::vec(0u8..4, 0..3)
    ) {
        let container = open(&model, &config);

        let scanned: Vec<Vec<u8>> = container
            .entries()
            .scan(&prefix)
            .map(|e| e.unwrap().0)
            .collect();
        let expected: Vec<Vec<u8>> = model
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        prop_assert_eq!(scanned, expected);
    }

    #[test]
    fn prop_range_is_exact(
        model in model(),
        config in config(),
        start in prop::collection::vec(0u8..4, 0..4),
        end in prop::collection::vec(0u8..4, 0..4)
    ) {
        let container = open(&model, &config);

        let ranged: Vec<Vec<u8>> = container
            .entries()
            .range(&start, &end)
            .map(|e| e.unwrap().0)
            .collect();
        let expected: Vec<Vec<u8>> = model
            .keys()
            .filter(|k| k.as_slice() >= start.as_slice() && k.as_slice() < end.as_slice())
            .cloned()
            .collect();
        prop_assert_eq!(ranged, expected);
    }

    #[test]
    fn prop_depth_is_logarithmic(model in model(), config in config()) {
        let container = open(&model, &config);
        let tree = container.entries();

        let (leaves, _) = tree.leaf_chain_stats().unwrap();
        let depth = tree.depth().unwrap();
        // Every internal level at least halves the node count
        let bound = 1 + (leaves as f64).log2().ceil() as u32;
        prop_assert!(depth <= bound, "depth {} > {} for {} leaves", depth, bound, leaves);
    }
}

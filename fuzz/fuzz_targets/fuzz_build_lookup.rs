#![no_main]
use dictree::core::{build_to_vec, Container};
use dictree::{BuildConfig, Metadata, ReaderConfig, TrailerLayout};
use libfuzzer_sys::{arbitrary::{Arbitrary, Unstructured}, fuzz_target};
use std::collections::BTreeMap;

#[derive(Debug, Arbitrary)]
struct BuildInput {
    leaf_entries: u8,
    fan_out: u8,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    queries: Vec<Vec<u8>>,
}

fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);
    let input: BuildInput = match u.arbitrary() {
        Ok(input) => input,
        Err(_) => return,
    };

    let config = BuildConfig::default()
        .with_leaf_entries(input.leaf_entries.max(1) as usize)
        .with_fan_out(input.fan_out.max(2) as usize);
    let bytes = build_to_vec(
        TrailerLayout::Single,
        &Metadata::new(),
        &config,
        input.entries.iter().map(|(k, v)| (k.clone(), v.clone())),
    )
    .unwrap();

    let container = Container::from_source(bytes, &ReaderConfig::default()).unwrap();
    let tree = container.entries();
    for query in input.queries.iter().take(32) {
        let found = tree.lookup(query).unwrap();
        assert_eq!(found.as_ref(), input.entries.get(query));
    }
    let all: Vec<_> = tree.iter().map(|e| e.unwrap()).collect();
    assert_eq!(all.len(), input.entries.len());
});

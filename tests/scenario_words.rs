//! End-to-end build and query scenarios

use dictree::core::{
    build_to_vec, Container, ContainerEncoder, ContainerWriter, TreeBuilder,
};
use dictree::{
    BuildConfig, CompressionMethod, DictError, Dictionary, DictionaryBuilder, Metadata,
    ReaderConfig, TrailerLayout,
};

const WORDS: [(&str, &str); 3] = [("apple", "fruit"), ("apply", "verb"), ("banana", "fruit")];

fn entries(container: &Container<Vec<u8>>) -> Vec<(String, String)> {
    container
        .entries()
        .iter()
        .map(|entry| {
            let (k, v) = entry.unwrap();
            (String::from_utf8(k).unwrap(), String::from_utf8(v).unwrap())
        })
        .collect()
}

#[test]
fn test_three_word_dictionary() {
    let bytes = build_to_vec(
        TrailerLayout::Single,
        &Metadata::new(),
        &BuildConfig::default(),
        WORDS,
    )
    .unwrap();
    let container = Container::from_source(bytes, &ReaderConfig::default()).unwrap();
    let tree = container.entries();

    assert_eq!(tree.lookup(b"apply").unwrap().unwrap(), b"verb");
    assert_eq!(tree.lookup(b"app").unwrap(), None);

    let apps: Vec<Vec<u8>> = tree.scan(b"app").map(|e| e.unwrap().0).collect();
    assert_eq!(apps, [b"apple".to_vec(), b"apply".to_vec()]);

    assert_eq!(
        entries(&container),
        WORDS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_every_compression_method() {
    for method in [
        CompressionMethod::None,
        CompressionMethod::Deflate,
        CompressionMethod::Lz4,
        CompressionMethod::Zstd,
    ] {
        let config = BuildConfig::default()
            .with_compression(method)
            .with_leaf_entries(1)
            .with_fan_out(2);
        let bytes = build_to_vec(TrailerLayout::Dual, &Metadata::new(), &config, WORDS).unwrap();
        assert_eq!(bytes[3], method as u8);

        let container = Container::from_source(bytes, &ReaderConfig::default()).unwrap();
        assert_eq!(container.header().compression, method);
        assert_eq!(entries(&container).len(), 3, "{:?}", method);
        assert_eq!(container.entries().depth().unwrap(), 3);
    }
}

#[test]
fn test_empty_dictionary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.dict");
    let info = DictionaryBuilder::new().build(&path).unwrap();
    assert_eq!(info.summary.entries.entries, 0);
    assert_eq!(info.summary.tokens.unwrap().entries, 0);

    let dict = Dictionary::open(&path).unwrap();
    assert_eq!(dict.metadata().entry_count, 0);
    assert_eq!(dict.lookup("").unwrap(), None);
    assert_eq!(dict.lookup("anything").unwrap(), None);
    assert!(dict.search("", 100).unwrap().is_empty());
    assert_eq!(dict.tokens("anything").unwrap(), None);
}

#[test]
fn test_unsorted_input_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unsorted.dict");

    let mut writer = ContainerWriter::create(
        &path,
        TrailerLayout::Single,
        &Metadata::new(),
        &BuildConfig::default(),
    )
    .unwrap();
    let err = writer
        .write_entries([("b", "2"), ("a", "1")])
        .unwrap_err();
    assert!(matches!(err, DictError::UnsortedInput { .. }));
    drop(writer);

    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_duplicate_key_rejected() {
    let mut builder = TreeBuilder::new(&BuildConfig::default()).unwrap();
    builder.push("same", "1").unwrap();
    match builder.push("same", "2") {
        Err(DictError::DuplicateKey { key }) => assert_eq!(key, b"same"),
        other => panic!("expected DuplicateKey, got {:?}", other),
    }
}

#[test]
fn test_dual_layout_trees_independent() {
    let mut encoder = ContainerEncoder::new(
        Vec::new(),
        TrailerLayout::Dual,
        &Metadata::new(),
        &BuildConfig::default(),
    )
    .unwrap();
    encoder.write_entries(WORDS).unwrap();
    encoder
        .write_tokens([("fruit", "apple banana"), ("verb", "apply")])
        .unwrap();
    let (bytes, summary) = encoder.finish().unwrap();
    assert_eq!(summary.entries.entries, 3);
    assert_eq!(summary.tokens.unwrap().entries, 2);

    let container = Container::from_source(bytes, &ReaderConfig::default()).unwrap();
    let tokens = container.tokens().unwrap();
    assert_eq!(tokens.lookup(b"verb").unwrap().unwrap(), b"apply");
    assert_eq!(tokens.lookup(b"apple").unwrap(), None);
    assert_eq!(container.entries().lookup(b"verb").unwrap(), None);
    assert_eq!(tokens.iter().count(), 2);
}

#[test]
fn test_metadata_survives() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.dict");
    let meta = Metadata::new()
        .with_content_version("2.1.0")
        .with_author("Editors")
        .with_email("editors@example.org")
        .with_comment("test build");

    let mut builder = DictionaryBuilder::new().metadata(meta.clone());
    for (name, value) in WORDS {
        builder.insert_entry(name, value);
    }
    builder.build(&path).unwrap();

    let dict = Dictionary::open(&path).unwrap();
    let stored = dict.metadata();
    assert_eq!(stored.author, meta.author);
    assert_eq!(stored.email, meta.email);
    assert_eq!(stored.create_time, meta.create_time);
    assert_eq!(stored.entry_count, 3);
    assert_eq!(
        stored.content_semver().unwrap(),
        Some(semver::Version::new(2, 1, 0))
    );
}

#[test]
fn test_invalid_metadata_rejected_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.dict");
    let result = ContainerWriter::create(
        &path,
        TrailerLayout::Single,
        &Metadata::new().with_content_version("not-a-version"),
        &BuildConfig::default(),
    );
    assert!(matches!(result, Err(DictError::InvalidMetadata(_))));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

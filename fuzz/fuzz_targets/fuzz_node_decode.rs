#![no_main]
use dictree::core::{decode_node, encode_node};
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes must decode or fail cleanly; anything that decodes must
// survive a re-encode unchanged
fuzz_target!(|data: &[u8]| {
    if let Ok(node) = decode_node(data, 0) {
        let encoded = encode_node(&node).unwrap();
        assert_eq!(encoded.len(), data.len());
        assert_eq!(decode_node(&encoded, 0).unwrap(), node);
    }
});

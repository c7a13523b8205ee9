#![no_main]
use dictree::core::Container;
use dictree::ReaderConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let container = match Container::from_source(data.to_vec(), &ReaderConfig::default()) {
        Ok(c) => c,
        Err(_) => return,
    };

    // Walk everything reachable; errors are fine, panics and hangs are not
    for entry in container.entries().iter().take(10_000) {
        if entry.is_err() {
            break;
        }
    }
    let _ = container.entries().lookup(b"query");
    if let Some(tokens) = container.tokens() {
        let _ = tokens.scan(b"p").take(100).count();
    }
});

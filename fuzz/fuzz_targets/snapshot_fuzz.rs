#![no_main]
use libfuzzer_sys::fuzz_target;
use skipdelta::chain::{Revisions, StoreOptions};
use skipdelta::codec::DeltaCodec;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(revs) = Revisions::from_json(text, DeltaCodec::default(), StoreOptions::default()) else {
        return;
    };

    // Loaded stores must reconstruct or fail cleanly, and re-serialize.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime.block_on(async {
        for index in 0..revs.len().min(64) {
            let _ = revs.depth(index);
            let _ = revs.get(index).await;
        }
    });
    let _ = revs.to_json();
});

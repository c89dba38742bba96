#![no_main]
use libfuzzer_sys::fuzz_target;
use skipdelta::codec::delta;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must only ever produce errors, never panics.
    let _ = delta::decode(&[], data);

    if data.len() >= 2 {
        let split = data.len() / 2;
        let (base, delta_bytes) = data.split_at(split);
        let _ = delta::decode(base, delta_bytes);
        let _ = delta::DeltaHeader::parse(delta_bytes);
    }
});

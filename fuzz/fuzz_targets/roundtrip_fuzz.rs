#![no_main]
use libfuzzer_sys::fuzz_target;
use skipdelta::codec::{DeltaOptions, delta};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte: level in the low nibble, checksum in bit 4.
    let flags = data[0];
    let payload = &data[1..];
    let opts = DeltaOptions {
        level: u32::from(flags & 0x0F) % 10,
        checksum: flags & 0x10 != 0,
    };

    let split = payload.len() / 2;
    let (base, target) = payload.split_at(split);

    let encoded = delta::encode(base, target, &opts);
    let decoded = delta::decode(base, &encoded).unwrap();
    assert_eq!(decoded, target);
});

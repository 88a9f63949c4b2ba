#![no_main]

use libfuzzer_sys::fuzz_target;
use wire::{decode_event, encode_event, EventRegistry};

fuzz_target!(|data: &[u8]| {
    let registry = EventRegistry::standard();
    if let Ok(event) = decode_event(data, &registry) {
        assert_eq!(encode_event(&event), data);
    }
});

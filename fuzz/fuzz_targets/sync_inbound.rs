#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use session::{KinematicWorld, LoopbackHub, SessionConfig, SyncLoop};
use wire::{EventRegistry, PeerId};

fuzz_target!(|data: &[u8]| {
    let hub = LoopbackHub::new();
    let host = PeerId::new(1);
    let Ok(mut session) = SyncLoop::new(
        host,
        true,
        SessionConfig::for_testing(),
        Arc::new(EventRegistry::standard()),
        hub.connect(host),
        KinematicWorld::new(),
    ) else {
        return;
    };

    // Length-prefixed frames, one tick per frame.
    let mut idx = 0usize;
    let mut injected = 0u64;
    while idx < data.len() && idx < 4096 {
        let len = usize::from(data[idx] % 40) + 1;
        idx += 1;
        let end = (idx + len).min(data.len());
        hub.inject(host, data[idx..end].to_vec());
        idx = end;
        injected += 1;
        session.tick();
    }
    assert_eq!(session.stats().frames_received, injected);
    assert!(session.is_host());
});

//! Fuzz target for handshake message parsing
//!
//! Feeds arbitrary frames to a started handshake. It must fail cleanly,
//! never panic, and never reach `Live` without a valid digest.

#![no_main]

use beamlink_core::handshake::parse_challenge;
use beamlink_core::{Cookie, DistConfig, Handshake, HandshakeState};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let _ = parse_challenge(data);

    let config = DistConfig::new(
        "fuzz@localhost".parse().unwrap(),
        Cookie::new("fuzz-cookie").unwrap(),
    );
    let mut handshake = Handshake::new(Arc::new(config));
    handshake.start().unwrap();

    // status, then the input split in two as challenge and ack
    let _ = handshake.on_frame(b"sok");
    let split = data.len() / 2;
    for frame in [&data[..split], &data[split..]] {
        if handshake.on_frame(frame).is_err() {
            assert_eq!(handshake.state(), HandshakeState::Failed);
            return;
        }
    }
});

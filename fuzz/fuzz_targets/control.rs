//! Fuzz target for control message decoding

#![no_main]

use beamlink_core::ControlMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must encode again under the same tag
    if let Ok(msg) = ControlMessage::decode(data) {
        let encoded = msg.encode().unwrap();
        let again = ControlMessage::decode(&encoded).unwrap();
        assert_eq!(again.tag(), msg.tag());
    }
});

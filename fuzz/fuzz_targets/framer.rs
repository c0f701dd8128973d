//! Fuzz target for frame extraction
//!
//! Arbitrary bytes must never panic the framer, and whatever it takes out
//! must account for exactly the bytes it consumed.

#![no_main]

use beamlink_core::{Framer, HeaderWidth};
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for live in [false, true] {
        let mut framer = Framer::new();
        if live {
            framer.upgrade();
        }
        let header = framer.width().bytes();
        let mut buffer = BytesMut::from(data);

        loop {
            let before = buffer.len();
            let ticks = if framer.width() == HeaderWidth::Live {
                framer.take_ticks(&mut buffer)
            } else {
                0
            };
            match framer.try_take_frame(&mut buffer) {
                Some(frame) => {
                    assert_eq!(before - buffer.len(), ticks * header + header + frame.len());
                }
                None => {
                    assert_eq!(before - buffer.len(), ticks * header);
                    break;
                }
            }
        }
    }
});

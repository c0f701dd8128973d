//! Length-prefixed framing.
//!
//! Frames are `[length][payload]` with a big-endian length header. The
//! header is 2 bytes wide until the handshake completes and 4 bytes after.
//! A zero-length frame is a tick (keepalive) and must be echoed.

use crate::error::FrameError;
use bytes::{BufMut, Bytes, BytesMut};

/// Width of the frame length header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderWidth {
    /// `u16` length, used during the handshake
    #[default]
    Handshake,
    /// `u32` length, used once the connection is live
    Live,
}

impl HeaderWidth {
    /// Header size in bytes
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Handshake => 2,
            Self::Live => 4,
        }
    }

    /// Largest payload the header can describe
    #[must_use]
    pub const fn max_payload(self) -> usize {
        match self {
            Self::Handshake => u16::MAX as usize,
            Self::Live => u32::MAX as usize,
        }
    }
}

/// Frame encoder/decoder for one connection.
#[derive(Debug, Clone)]
pub struct Framer {
    width: HeaderWidth,
    limit: usize,
}

impl Default for Framer {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl Framer {
    /// New framer with the handshake (`u16`) header
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// New framer that rejects incoming frames longer than `limit` bytes
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            width: HeaderWidth::Handshake,
            limit,
        }
    }

    /// Largest incoming payload accepted at the current width
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.min(self.width.max_payload())
    }

    /// Current header width
    #[must_use]
    pub fn width(&self) -> HeaderWidth {
        self.width
    }

    /// Switch to the live (`u32`) header.
    ///
    /// Returns `false` if the framer was already live.
    pub fn upgrade(&mut self) -> bool {
        if self.width == HeaderWidth::Live {
            return false;
        }
        self.width = HeaderWidth::Live;
        true
    }

    /// Prepend the length header to `payload`.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::PayloadTooLarge` if the payload does not fit the
    /// current header.
    pub fn frame(&self, payload: &[u8]) -> Result<Bytes, FrameError> {
        let too_large = || FrameError::PayloadTooLarge {
            len: payload.len(),
            width: self.width.bytes(),
        };

        let mut out = BytesMut::with_capacity(self.width.bytes() + payload.len());
        match self.width {
            HeaderWidth::Handshake => {
                out.put_u16(u16::try_from(payload.len()).map_err(|_| too_large())?);
            }
            HeaderWidth::Live => {
                out.put_u32(u32::try_from(payload.len()).map_err(|_| too_large())?);
            }
        }
        out.put_slice(payload);
        Ok(out.freeze())
    }

    /// An empty (tick) frame at the current width
    #[must_use]
    pub fn tick(&self) -> Bytes {
        Bytes::from(vec![0u8; self.width.bytes()])
    }

    /// Length of the next frame's payload, if its header is buffered
    #[must_use]
    pub fn peek_len(&self, buffer: &[u8]) -> Option<usize> {
        match self.width {
            HeaderWidth::Handshake => {
                let header: [u8; 2] = buffer.get(..2)?.try_into().ok()?;
                Some(usize::from(u16::from_be_bytes(header)))
            }
            HeaderWidth::Live => {
                let header: [u8; 4] = buffer.get(..4)?.try_into().ok()?;
                usize::try_from(u32::from_be_bytes(header)).ok()
            }
        }
    }

    /// Whether the next buffered frame is a tick. Does not consume.
    #[must_use]
    pub fn peek_is_tick(&self, buffer: &[u8]) -> bool {
        self.peek_len(buffer) == Some(0)
    }

    /// Check the next buffered header against the incoming limit.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::LimitExceeded` if the announced length is larger
    /// than [`Framer::limit`]. An incomplete header passes.
    pub fn check_next(&self, buffer: &[u8]) -> Result<(), FrameError> {
        match self.peek_len(buffer) {
            Some(len) if len > self.limit() => Err(FrameError::LimitExceeded {
                len,
                limit: self.limit(),
            }),
            _ => Ok(()),
        }
    }

    /// Remove and return one complete frame's payload.
    ///
    /// Leaves `buffer` untouched and returns `None` if the frame is not yet
    /// complete.
    pub fn try_take_frame(&self, buffer: &mut BytesMut) -> Option<Bytes> {
        let len = self.peek_len(buffer)?;
        let header = self.width.bytes();
        let total = header.checked_add(len)?;
        if buffer.len() < total {
            return None;
        }
        let mut frame = buffer.split_to(total);
        Some(frame.split_off(header).freeze())
    }

    /// Consume every tick at the front of `buffer`, returning how many.
    pub fn take_ticks(&self, buffer: &mut BytesMut) -> usize {
        let mut ticks = 0;
        while self.peek_is_tick(buffer) {
            let _ = buffer.split_to(self.width.bytes());
            ticks += 1;
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_handshake_header() {
        let framer = Framer::new();
        let frame = framer.frame(b"sok").unwrap();
        assert_eq!(&frame[..], &[0, 3, b's', b'o', b'k']);
    }

    #[test]
    fn test_frame_live_header() {
        let mut framer = Framer::new();
        assert!(framer.upgrade());
        assert!(!framer.upgrade());
        let frame = framer.frame(b"ab").unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 2, b'a', b'b']);
        assert_eq!(&framer.tick()[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_frame_too_large_for_handshake() {
        let framer = Framer::new();
        let payload = vec![0u8; 70_000];
        assert_eq!(
            framer.frame(&payload),
            Err(FrameError::PayloadTooLarge {
                len: 70_000,
                width: 2
            })
        );
    }

    #[test]
    fn test_take_frame_roundtrip() {
        let framer = Framer::new();
        let mut buf = BytesMut::from(&framer.frame(b"hello").unwrap()[..]);
        assert_eq!(framer.try_take_frame(&mut buf).unwrap(), &b"hello"[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_untouched() {
        let framer = Framer::new();
        let full = framer.frame(b"hello").unwrap();
        for cut in 0..full.len() {
            let mut buf = BytesMut::from(&full[..cut]);
            assert!(framer.try_take_frame(&mut buf).is_none());
            assert_eq!(&buf[..], &full[..cut]);
        }
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let framer = Framer::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&framer.frame(b"one").unwrap());
        buf.extend_from_slice(&framer.frame(b"two").unwrap());
        assert_eq!(framer.try_take_frame(&mut buf).unwrap(), &b"one"[..]);
        assert_eq!(framer.try_take_frame(&mut buf).unwrap(), &b"two"[..]);
        assert!(framer.try_take_frame(&mut buf).is_none());
    }

    #[test]
    fn test_ticks_before_data() {
        let mut framer = Framer::new();
        framer.upgrade();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&framer.tick());
        buf.extend_from_slice(&framer.tick());
        buf.extend_from_slice(&framer.frame(b"x").unwrap());

        assert!(framer.peek_is_tick(&buf));
        assert_eq!(framer.take_ticks(&mut buf), 2);
        assert!(!framer.peek_is_tick(&buf));
        assert_eq!(framer.try_take_frame(&mut buf).unwrap(), &b"x"[..]);
    }

    proptest::proptest! {
        #[test]
        fn prop_live_roundtrip(payload in proptest::collection::vec(proptest::num::u8::ANY, 0..2048)) {
            let mut framer = Framer::new();
            framer.upgrade();
            let mut buf = BytesMut::from(&framer.frame(&payload).unwrap()[..]);
            let frame = framer.try_take_frame(&mut buf).unwrap();
            proptest::prop_assert_eq!(&frame[..], &payload[..]);
            proptest::prop_assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_check_next_enforces_limit() {
        let mut framer = Framer::with_limit(1024);
        assert_eq!(framer.limit(), 1024);
        assert!(framer.check_next(&framer.frame(&[0u8; 1024]).unwrap()).is_ok());
        assert!(framer.check_next(&[0x04]).is_ok());
        assert_eq!(
            framer.check_next(&[0x04, 0x01]),
            Err(FrameError::LimitExceeded {
                len: 1025,
                limit: 1024
            })
        );

        framer.upgrade();
        assert_eq!(
            framer.check_next(&[0xff, 0xff, 0xff, 0xff]),
            Err(FrameError::LimitExceeded {
                len: u32::MAX as usize,
                limit: 1024
            })
        );
    }

    #[test]
    fn test_default_limit_is_header_width() {
        let mut framer = Framer::new();
        assert_eq!(framer.limit(), u16::MAX as usize);
        assert!(framer.check_next(&[0xff, 0xff]).is_ok());
        framer.upgrade();
        assert_eq!(framer.limit(), u32::MAX as usize);
        assert!(framer.check_next(&[0xff, 0xff, 0xff, 0xff]).is_ok());
    }

    #[test]
    fn test_peek_is_tick_needs_full_header() {
        let mut framer = Framer::new();
        framer.upgrade();
        assert!(!framer.peek_is_tick(&[0, 0]));
        assert!(framer.peek_is_tick(&[0, 0, 0, 0]));
    }
}

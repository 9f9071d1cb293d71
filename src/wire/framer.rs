//! Varint length-delimited framer for envelope streams.
//!
//! Stream transports (socket, serial) carry envelopes as:
//!
//!   `<varint length><envelope bytes>`
//!
//! The framer is incremental: feed it arbitrary chunks, pull whole frames
//! when available. Malformed input (oversize length, runaway varint) is
//! handled by advancing one byte and re-trying, which resynchronizes on the
//! next valid frame boundary after line noise or a partial write.

use bytes::{Buf, BytesMut};

/// Upper bound on a single frame; anything larger is treated as corruption.
const MAX_FRAME_SIZE: usize = 64 * 1024; // 64 KB

pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete frame, if one is buffered. Returns `None`
    /// when more bytes are needed or after discarding a corrupt byte.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            return None;
        }

        let mut len: usize = 0;
        let mut shift = 0u32;
        let mut varint_len = 0usize;
        for b in self.buf.iter() {
            varint_len += 1;
            len |= ((b & 0x7F) as usize) << shift;
            if (b & 0x80) == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                // varint far beyond any sane frame length: resync
                self.buf.advance(1);
                return None;
            }
        }
        if self.buf.len() < varint_len || varint_len == 0 {
            return None;
        }
        // Incomplete varint (last buffered byte still has the continuation bit)
        if self.buf[varint_len - 1] & 0x80 != 0 {
            return None;
        }
        if len > MAX_FRAME_SIZE {
            self.buf.advance(1);
            return None;
        }
        if self.buf.len() < varint_len + len {
            return None;
        }

        let _ = self.buf.split_to(varint_len);
        Some(self.buf.split_to(len).to_vec())
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefix `payload` with its varint length, ready for a stream write.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    let mut len = payload.len();
    loop {
        let mut b = (len & 0x7F) as u8;
        len >>= 7;
        if len != 0 {
            b |= 0x80;
        }
        out.push(b);
        if len == 0 {
            break;
        }
    }
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_single_frame() {
        let payload = b"hello mesh".to_vec();
        let mut dec = FrameDecoder::new();
        dec.push(&encode_frame(&payload));
        assert_eq!(dec.next_frame(), Some(payload));
        assert_eq!(dec.next_frame(), None);
    }

    #[test]
    fn partial_then_complete() {
        let payload = vec![0xAB; 300]; // needs a 2-byte varint
        let framed = encode_frame(&payload);
        let mut dec = FrameDecoder::new();
        dec.push(&framed[..1]);
        assert_eq!(dec.next_frame(), None);
        dec.push(&framed[1..150]);
        assert_eq!(dec.next_frame(), None);
        dec.push(&framed[150..]);
        assert_eq!(dec.next_frame(), Some(payload));
    }

    #[test]
    fn two_frames_one_push() {
        let a = b"first".to_vec();
        let b = b"second".to_vec();
        let mut wire = encode_frame(&a);
        wire.extend_from_slice(&encode_frame(&b));
        let mut dec = FrameDecoder::new();
        dec.push(&wire);
        assert_eq!(dec.next_frame(), Some(a));
        assert_eq!(dec.next_frame(), Some(b));
        assert_eq!(dec.next_frame(), None);
    }

    #[test]
    fn resync_after_garbage() {
        let payload = b"good frame".to_vec();
        let mut dec = FrameDecoder::new();
        // A runaway varint: five continuation bytes trip the shift guard.
        dec.push(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        let framed = encode_frame(&payload);
        dec.push(&framed);
        // Drain: each call may discard one garbage byte before the real frame parses.
        let mut got = None;
        for _ in 0..16 {
            if let Some(f) = dec.next_frame() {
                got = Some(f);
                break;
            }
        }
        assert_eq!(got, Some(payload));
    }

    #[test]
    fn oversize_frame_dropped() {
        let mut dec = FrameDecoder::new();
        // Claims a 1 MB frame: length varint for 1_048_576
        dec.push(&[0x80, 0x80, 0xC0, 0x00]);
        assert_eq!(dec.next_frame(), None); // first byte discarded
    }
}

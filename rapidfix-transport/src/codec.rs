/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Byte-stream framing into whole FIX messages.
//!
//! The framer scans for `8=`, discarding any preceding junk with a warning,
//! reads the declared BodyLength from the following `9=` field, skips the
//! body, and slices the message through the SOH terminating the `10=`
//! checksum field. Partial buffers persist across reads; corrupt prologues
//! resync to the next `8=` instead of killing the connection, so a framing
//! error never unwinds into the reactor.

use bytes::{Bytes, BytesMut};
use memchr::memchr;
use memchr::memmem;
use rapidfix_core::types::SOH;
use tokio_util::codec::{Decoder, Encoder};

/// How many bytes past the BeginString SOH we tolerate before declaring the
/// prologue corrupt and resyncing.
const PROLOGUE_SLACK: usize = 16;

/// Tokio codec slicing a byte stream into whole FIX messages.
///
/// Emitted frames start with `8=` and end with the SOH following the
/// `10=NNN` checksum field. Checksum and structure validation belong to the
/// dictionary parser, not the framer.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Upper bound on a single message's byte size.
    max_message_size: usize,
}

impl FrameCodec {
    /// Creates a codec with the default 1 MiB message bound.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: 1024 * 1024,
        }
    }

    /// Overrides the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Drops `n` leading bytes as junk, keeping the stream aligned.
    fn discard(src: &mut BytesMut, n: usize) {
        tracing::warn!(bytes = n, "discarding junk before message start");
        let _ = src.split_to(n);
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            // Align the buffer on "8=". Anything before it is junk; keep
            // the final byte in case it is a split '8'.
            match memmem::find(src, b"8=") {
                Some(0) => {}
                Some(p) => Self::discard(src, p),
                None => {
                    if src.len() > 1 {
                        let keep = src.len() - 1;
                        Self::discard(src, keep);
                    }
                    return Ok(None);
                }
            }

            // BeginString value runs to the first SOH.
            let Some(soh1) = memchr(SOH, &src[2..]).map(|p| p + 2) else {
                return Ok(None);
            };

            // The BodyLength field follows. A prologue with no "9=" within
            // slack distance is corrupt; resync past this "8=".
            let after = soh1 + 1;
            let Some(eq9) = memmem::find(&src[after..], b"9=").map(|p| p + after) else {
                if src.len() > after + PROLOGUE_SLACK {
                    Self::discard(src, 2);
                    continue;
                }
                return Ok(None);
            };
            if eq9 > after + PROLOGUE_SLACK {
                Self::discard(src, 2);
                continue;
            }

            let Some(soh9) = memchr(SOH, &src[eq9..]).map(|p| p + eq9) else {
                return Ok(None);
            };

            let Ok(body_len) = std::str::from_utf8(&src[eq9 + 2..soh9])
                .map_err(|_| ())
                .and_then(|s| s.parse::<usize>().map_err(|_| ()))
            else {
                tracing::warn!("unparseable BodyLength, resyncing");
                Self::discard(src, 2);
                continue;
            };

            if body_len > self.max_message_size {
                tracing::warn!(body_len, "declared body length exceeds bound, resyncing");
                Self::discard(src, 2);
                continue;
            }

            // Skip the body, then find the checksum field and its SOH.
            let body_end = soh9 + 1 + body_len;
            if src.len() < body_end + 4 {
                src.reserve(body_end + 8 - src.len());
                return Ok(None);
            }
            let Some(cs) = memmem::find(&src[body_end..], b"10=").map(|p| p + body_end) else {
                if src.len() > body_end + PROLOGUE_SLACK {
                    tracing::warn!("no checksum after declared body, resyncing");
                    Self::discard(src, 2);
                    continue;
                }
                return Ok(None);
            };
            let Some(end) = memchr(SOH, &src[cs..]).map(|p| p + cs + 1) else {
                return Ok(None);
            };

            return Ok(Some(src.split_to(end).freeze()));
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg() -> &'static [u8] {
        b"8=FIX.4.2\x019=5\x0135=0\x0110=161\x01"
    }

    #[test]
    fn test_single_message() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(msg());

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], msg());
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_split_read() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(b"8=FIX.4.2\x019=5\x0135");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"=0\x0110=161\x018=FIX.4.2\x019=5\x0135=0\x0110=161\x01");
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first[..], msg());
        assert_eq!(&second[..], msg());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_junk_before_message_discarded() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"NOISE\x01garbage"[..]);
        buf.extend_from_slice(msg());

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], msg());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_two_messages_one_read() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(msg());
        buf.extend_from_slice(msg());

        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_body_with_embedded_soh_passes_through() {
        // BodyLength spans the raw-data field; the framer must not treat
        // payload SOH bytes as field boundaries.
        let body = b"35=B\x0195=3\x0196=a\x01b\x01";
        let mut wire = format!("8=FIX.4.2\x019={}\x01", body.len()).into_bytes();
        wire.extend_from_slice(body);
        wire.extend_from_slice(b"10=000\x01");

        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&wire[..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], &wire[..]);
    }

    #[test]
    fn test_partial_junk_keeps_possible_prefix() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"junk8"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        // The trailing '8' survives in case "=" follows in the next read.
        assert_eq!(&buf[..], b"8");

        buf.extend_from_slice(&msg()[1..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], msg());
    }

    #[test]
    fn test_corrupt_prologue_resyncs_to_next_message() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"8=FIX.4.2\x01NOT-A-LENGTH-FIELD-AT-ALL\x01"[..]);
        buf.extend_from_slice(msg());

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], msg());
    }
}

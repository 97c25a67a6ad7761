//! Line framing for secure channel payloads.
//!
//! Each frame is one text-safe (base64) channel payload terminated by `\n`.
//! Frames longer than the configured maximum are rejected before the
//! terminator is found, so a peer cannot grow the read buffer without bound.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_FRAME_SIZE;
use crate::error::{constants, ProtocolError, Result};

const DELIMITER: u8 = b'\n';

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
    // Bytes already scanned for a delimiter in the current frame
    scanned: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            scanned: 0,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let position = src[self.scanned..].iter().position(|b| *b == DELIMITER);

        let Some(offset) = position else {
            if src.len() > self.max_frame_size {
                return Err(ProtocolError::OversizedPacket(src.len()));
            }
            self.scanned = src.len();
            return Ok(None);
        };

        let end = self.scanned + offset;
        self.scanned = 0;
        if end > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(end));
        }

        let line = src.split_to(end);
        src.advance(1);

        let text = std::str::from_utf8(&line)
            .map_err(|_| ProtocolError::TransportIntegrity(constants::ERR_INVALID_BASE64))?;
        Ok(Some(text.trim_end_matches('\r').to_string()))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: String, dst: &mut BytesMut) -> Result<()> {
        if frame.len() > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(frame.len()));
        }
        dst.reserve(frame.len() + 1);
        dst.put_slice(frame.as_bytes());
        dst.put_u8(DELIMITER);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_decode_waits_for_delimiter() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"abc"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"def\nghi");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("abcdef"));
        assert_eq!(&buf[..], b"ghi");
    }

    #[test]
    fn test_encode_appends_delimiter() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode("SGVsbG8=".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"SGVsbG8=\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("SGVsbG8="));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut codec = FrameCodec::new(8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::OversizedPacket(10))
        ));
        assert!(codec.encode("0123456789".to_string(), &mut BytesMut::new()).is_err());
    }
}

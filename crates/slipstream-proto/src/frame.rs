//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet: a 16-byte raw binary header plus
//! a variable-length payload. The relay routes frames without deserializing
//! payloads; the structs in [`crate::payloads`] exist for the few frames the
//! server itself reads or builds.

use bytes::{BufMut, Bytes};

use crate::{
    Command, FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame.
///
/// Layout on the wire: `[FrameHeader: 16 bytes] + [payload: variable]`.
///
/// # Invariants
///
/// - `payload.len()` always matches `header.payload_size()`; enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
/// - `payload.len()` never exceeds [`FrameHeader::MAX_PAYLOAD_SIZE`];
///   violations are rejected at encode and decode time.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame header.
    pub header: FrameHeader,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame, filling in the header's `payload_size`.
    ///
    /// # Panics
    ///
    /// Panics if `payload.len() > u32::MAX`, which cannot happen in practice
    /// because `Bytes` is bounded by `isize::MAX` allocations and the
    /// protocol ceiling is far below that.
    #[must_use]
    pub fn new(command: Command, source: u32, stream_id: u32, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let mut header = FrameHeader::new(command, source, stream_id);
        header.payload_size =
            u32::try_from(payload.len()).expect("payload length fits in u32").to_le_bytes();

        Self { header, payload }
    }

    /// Command of this frame. `None` if the raw value is unrecognized.
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        self.header.command()
    }

    /// Payload interpreted as text, for reason strings and chat lines.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Encode the frame into a buffer.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] if the payload exceeds the wire
    /// ceiling. This is the enforcement point for server-built frames.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire format.
    ///
    /// Only `header.payload_size()` bytes after the header are consumed;
    /// trailing data is ignored.
    ///
    /// # Errors
    ///
    /// Propagates header parse errors and returns
    /// [`ProtocolError::FrameTruncated`] if the payload is shorter than the
    /// header claims.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE + payload_size;

        if bytes.len() < total_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..total_size]);

        debug_assert_eq!(payload.len(), payload_size);

        Ok(Self { header, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_with_payload_round_trips() {
        let frame = Frame::new(Command::Chat, 42, 0, &b"hello there"[..]);
        assert_eq!(frame.header.payload_size(), 11);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(parsed.command(), Some(Command::Chat));
        assert_eq!(parsed.header.source(), 42);
        assert_eq!(parsed.payload, frame.payload);
    }

    #[test]
    fn reject_truncated_frame() {
        let frame = Frame::new(Command::StreamData, 1, 9, vec![0u8; 100]);
        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let result = Frame::decode(&wire[..FrameHeader::SIZE + 50]);
        assert!(matches!(result, Err(ProtocolError::FrameTruncated { .. })));
    }

    #[test]
    fn reject_oversized_encode() {
        let frame = Frame::new(
            Command::StreamData,
            1,
            0,
            vec![0u8; FrameHeader::MAX_PAYLOAD_SIZE as usize + 1],
        );

        let mut wire = Vec::new();
        assert!(matches!(frame.encode(&mut wire), Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn trailing_bytes_ignored() {
        let frame = Frame::new(Command::Welcome, 3, 0, 5u32.to_le_bytes().to_vec());
        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");
        wire.extend_from_slice(b"garbage");

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(parsed.payload.len(), 4);
    }
}

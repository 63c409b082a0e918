//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 16-byte structure serialized as raw binary
//! (little-endian). The relay makes every routing decision from this header
//! without touching the payload.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Command,
    errors::{ProtocolError, Result},
};

/// Fixed 16-byte frame header (little-endian).
///
/// Fields are stored as raw byte arrays to keep the struct alignment-free so
/// it can be cast directly from any position in a network buffer. All bit
/// patterns are valid, so casting untrusted bytes cannot cause undefined
/// behavior; command validity is checked separately via [`Self::command`].
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    /// u32 command, see [`Command`] for recognized values.
    command: [u8; 4],
    /// u32 source uid; `SERVER_UID` for server-originated frames.
    source: [u8; 4],
    /// u32 stream id chosen by the source client.
    stream_id: [u8; 4],
    /// u32 payload length following the header.
    pub(crate) payload_size: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 16;

    /// Maximum payload size accepted on the wire.
    ///
    /// Headers claiming more are rejected during parsing and the receiving
    /// side closes the socket.
    pub const MAX_PAYLOAD_SIZE: u32 = 8192;

    /// Create a new header. `payload_size` starts at zero and is filled in by
    /// [`Frame::new`](crate::Frame::new).
    #[must_use]
    pub fn new(command: Command, source: u32, stream_id: u32) -> Self {
        Self {
            command: command.to_u32().to_le_bytes(),
            source: source.to_le_bytes(),
            stream_id: stream_id.to_le_bytes(),
            payload_size: [0; 4],
        }
    }

    /// Parse a header from the front of a network buffer (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if fewer than 16 bytes are available
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed payload exceeds
    ///   [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        let payload_size = u32::from_le_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Command as raw u32.
    #[must_use]
    pub fn command_raw(&self) -> u32 {
        u32::from_le_bytes(self.command)
    }

    /// Command as enum. `None` if unrecognized.
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        Command::from_u32(self.command_raw())
    }

    /// Source uid.
    #[must_use]
    pub fn source(&self) -> u32 {
        u32::from_le_bytes(self.source)
    }

    /// Rewrite the source uid. The relay stamps the authoritative sender uid
    /// on every relayed frame; clients cannot spoof each other.
    pub fn set_source(&mut self, source: u32) {
        self.source = source.to_le_bytes();
    }

    /// Stream id.
    #[must_use]
    pub fn stream_id(&self) -> u32 {
        u32::from_le_bytes(self.stream_id)
    }

    /// Payload length following the header.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_le_bytes(self.payload_size)
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("command", &self.command_raw())
            .field("source", &self.source())
            .field("stream_id", &self.stream_id())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

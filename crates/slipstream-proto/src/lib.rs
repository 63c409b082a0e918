//! Wire protocol for the slipstream relay server.
//!
//! Every message on the wire is a [`Frame`]: a fixed 16-byte little-endian
//! [`FrameHeader`] followed by `payload_size` bytes of payload. The relay
//! routes frames on the header alone; payloads are opaque except for the
//! handful of fixed-width structs in [`payloads`] that the server itself
//! reads or emits (credentials, roster rows, stream registrations).
//!
//! # Components
//!
//! - [`FrameHeader`]: zero-copy header parse/serialize
//! - [`Frame`]: header + payload, encode/decode
//! - [`Command`]: the protocol command set
//! - [`payloads`]: fixed-width payload structs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod errors;
mod frame;
mod header;
pub mod payloads;

pub use command::Command;
pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;

/// Protocol version string exchanged during the handshake.
///
/// A client whose Hello carries anything else is rejected with
/// [`Command::WrongVersion`].
pub const PROTOCOL_VERSION: &str = "SLIPSTREAM-1.4";

/// Source uid used by server-originated frames.
///
/// The wire field is unsigned; the server's "uid -1" convention is pinned to
/// this sentinel everywhere instead of relying on signed casts.
pub const SERVER_UID: u32 = 0xFFFF_FFFF;

/// Stream id used by server-originated frames that are not bound to any
/// client stream (chat replies, disconnect notices).
pub const SERVER_STREAM: u32 = 0xFFFF_FFFF;

//! Fixed-width payload structs.
//!
//! The handful of payloads the server itself reads or builds are raw binary
//! structs with NUL-padded fixed-width string fields (nickname 20 bytes,
//! token 60, stream name 128), little-endian integers, alignment-free layout.
//! Everything else on the wire stays opaque to the relay.

use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// NUL-pad a string into a fixed-width field, truncating on a char boundary.
#[must_use]
pub fn pack_str<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let mut end = s.len().min(N);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&s.as_bytes()[..end]);
    out
}

/// Read a NUL-padded fixed-width field back into a string (lossy).
#[must_use]
pub fn unpack_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Cast a payload to a fixed-width struct reference, checking the size.
fn cast_payload<T: FromBytes + KnownLayout + Immutable>(payload: &[u8]) -> Result<&T> {
    T::ref_from_bytes(payload).map_err(|_| ProtocolError::PayloadMismatch {
        expected: size_of::<T>(),
        actual: payload.len(),
    })
}

/// Client identity presented during the handshake.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct UserCredentials {
    username: [u8; 20],
    user_token: [u8; 60],
}

impl UserCredentials {
    /// Serialized size.
    pub const SIZE: usize = 80;

    /// Build credentials from a username and opaque identity token.
    #[must_use]
    pub fn new(username: &str, user_token: &str) -> Self {
        Self { username: pack_str(username), user_token: pack_str(user_token) }
    }

    /// Parse from a frame payload.
    pub fn from_payload(payload: &[u8]) -> Result<&Self> {
        cast_payload(payload)
    }

    /// Requested nickname.
    #[must_use]
    pub fn username(&self) -> String {
        unpack_str(&self.username)
    }

    /// Opaque identity token used for auth lookup.
    #[must_use]
    pub fn user_token(&self) -> String {
        unpack_str(&self.user_token)
    }

    /// Raw bytes for the wire.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }
}

/// Roster row sent with UserJoin and UserInfo frames.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct UserJoinInfo {
    version: [u8; 4],
    slot: [u8; 4],
    color: [u8; 4],
    auth_flags: [u8; 4],
    nickname: [u8; 20],
}

impl UserJoinInfo {
    /// Serialized size.
    pub const SIZE: usize = 36;

    /// Current roster row format version.
    pub const VERSION: u32 = 1;

    /// Build a roster row.
    #[must_use]
    pub fn new(slot: u32, color: u32, auth_flags: u32, nickname: &str) -> Self {
        Self {
            version: Self::VERSION.to_le_bytes(),
            slot: slot.to_le_bytes(),
            color: color.to_le_bytes(),
            auth_flags: auth_flags.to_le_bytes(),
            nickname: pack_str(nickname),
        }
    }

    /// Parse from a frame payload.
    pub fn from_payload(payload: &[u8]) -> Result<&Self> {
        cast_payload(payload)
    }

    /// Table slot at the time the row was built.
    #[must_use]
    pub fn slot(&self) -> u32 {
        u32::from_le_bytes(self.slot)
    }

    /// Assigned color number.
    #[must_use]
    pub fn color(&self) -> u32 {
        u32::from_le_bytes(self.color)
    }

    /// Raw auth flag bits.
    #[must_use]
    pub fn auth_flags(&self) -> u32 {
        u32::from_le_bytes(self.auth_flags)
    }

    /// Nickname.
    #[must_use]
    pub fn nickname(&self) -> String {
        unpack_str(&self.nickname)
    }

    /// Raw bytes for the wire.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }
}

/// Server identity blob sent in reply to a valid Hello.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ServerSettings {
    protocol: [u8; 20],
    name: [u8; 64],
}

impl ServerSettings {
    /// Serialized size.
    pub const SIZE: usize = 84;

    /// Build the settings blob.
    #[must_use]
    pub fn new(protocol: &str, name: &str) -> Self {
        Self { protocol: pack_str(protocol), name: pack_str(name) }
    }

    /// Parse from a frame payload.
    pub fn from_payload(payload: &[u8]) -> Result<&Self> {
        cast_payload(payload)
    }

    /// Protocol version string.
    #[must_use]
    pub fn protocol(&self) -> String {
        unpack_str(&self.protocol)
    }

    /// Server display name.
    #[must_use]
    pub fn name(&self) -> String {
        unpack_str(&self.name)
    }

    /// Raw bytes for the wire.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }
}

/// What a registered stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StreamKind {
    /// A driveable vehicle.
    Truck = 0,
    /// A walking character.
    Character = 1,
    /// AI-controlled traffic.
    AiTraffic = 2,
    /// A chat channel.
    Chat = 3,
}

impl StreamKind {
    /// Parse a raw wire value. `None` if out of range.
    #[must_use]
    pub fn from_i32(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Truck),
            1 => Some(Self::Character),
            2 => Some(Self::AiTraffic),
            3 => Some(Self::Chat),
            _ => None,
        }
    }

    /// Human-readable label for logs and listings.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Truck => "truck",
            Self::Character => "character",
            Self::AiTraffic => "aitraffic",
            Self::Chat => "chat",
        }
    }
}

/// Stream registration record carried by StreamRegister frames.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct StreamRegistration {
    kind: [u8; 4],
    status: [u8; 4],
    name: [u8; 128],
}

impl StreamRegistration {
    /// Serialized size.
    pub const SIZE: usize = 136;

    /// Build a registration record.
    #[must_use]
    pub fn new(kind: StreamKind, status: i32, name: &str) -> Self {
        Self {
            kind: (kind as i32).to_le_bytes(),
            status: status.to_le_bytes(),
            name: pack_str(name),
        }
    }

    /// Parse from a frame payload.
    pub fn from_payload(payload: &[u8]) -> Result<&Self> {
        cast_payload(payload)
    }

    /// Stream kind. `None` if the raw value is out of range.
    #[must_use]
    pub fn kind(&self) -> Option<StreamKind> {
        StreamKind::from_i32(i32::from_le_bytes(self.kind))
    }

    /// Raw stream status value.
    #[must_use]
    pub fn status(&self) -> i32 {
        i32::from_le_bytes(self.status)
    }

    /// Stream name up to the first NUL.
    #[must_use]
    pub fn name(&self) -> String {
        unpack_str(&self.name)
    }

    /// Terminate the name field at the first space and force the final byte
    /// to NUL. Registration names are single tokens on the wire; anything
    /// after a space is client garbage.
    pub fn sanitize_name(&mut self) {
        if let Some(pos) = self.name.iter().position(|&b| b == b' ') {
            for b in &mut self.name[pos..] {
                *b = 0;
            }
        }
        self.name[127] = 0;
    }

    /// Raw bytes for the wire.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }
}

/// Out-of-band prefix on VehicleData payloads, ahead of the position floats.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct VehicleOob {
    /// Simulation time in milliseconds.
    pub time: [u8; 4],
    /// Engine RPM.
    pub engine_speed: [u8; 4],
    /// Throttle position.
    pub engine_force: [u8; 4],
    /// Light/horn/particle flag bits.
    pub flags: [u8; 4],
}

impl VehicleOob {
    /// Serialized size.
    pub const SIZE: usize = 16;
}

/// Extract the vehicle position from a VehicleData payload.
///
/// `None` if the payload is too short to carry the out-of-band prefix plus
/// three little-endian floats.
#[must_use]
pub fn vehicle_position(payload: &[u8]) -> Option<[f32; 3]> {
    let floats = payload.get(VehicleOob::SIZE..VehicleOob::SIZE + 12)?;

    let mut pos = [0f32; 3];
    for (i, chunk) in floats.chunks_exact(4).enumerate() {
        pos[i] = f32::from_le_bytes(chunk.try_into().ok()?);
    }
    Some(pos)
}

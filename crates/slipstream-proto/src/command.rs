//! Protocol command set.
//!
//! Command values are part of the wire contract; they are never reordered or
//! reused. The relay recognizes every command below and treats anything else
//! as a protocol violation.

use crate::errors::ProtocolError;

/// Wire command carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Client handshake opener; payload is the protocol version string.
    Hello = 1025,
    /// Server reply to a valid Hello; payload is a
    /// [`ServerSettings`](crate::payloads::ServerSettings).
    ServerSettings = 1026,
    /// Rejection: server is at capacity.
    ServerFull = 1027,
    /// Rejection: protocol version mismatch.
    WrongVersion = 1028,
    /// Rejection: source address is banned.
    Banned = 1029,
    /// Admission succeeded; payload is the assigned color number (u32).
    Welcome = 1030,
    /// Client credentials during handshake; roster row in the announce burst.
    UserInfo = 1031,
    /// A client joined; payload is a [`UserJoinInfo`](crate::payloads::UserJoinInfo).
    UserJoin = 1032,
    /// A client left gracefully; payload is the reason text.
    UserLeave = 1033,
    /// Register a logical stream; payload is a
    /// [`StreamRegistration`](crate::payloads::StreamRegistration).
    StreamRegister = 1034,
    /// Opaque stream payload relayed between clients.
    StreamData = 1035,
    /// Chat line.
    Chat = 1036,
    /// Private chat; payload starts with the little-endian target uid.
    PrivChat = 1037,
    /// Server-to-client game command text.
    GameCmd = 1038,
    /// Vehicle state snapshot; position floats follow the out-of-band prefix.
    VehicleData = 1039,
    /// Deprecated vehicle selection message. Logged and ignored.
    UseVehicle = 1040,
    /// Disconnect notice; payload is the reason text.
    Delete = 1041,
}

impl Command {
    /// Parse a raw wire value. `None` if unrecognized.
    #[must_use]
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            1025 => Some(Self::Hello),
            1026 => Some(Self::ServerSettings),
            1027 => Some(Self::ServerFull),
            1028 => Some(Self::WrongVersion),
            1029 => Some(Self::Banned),
            1030 => Some(Self::Welcome),
            1031 => Some(Self::UserInfo),
            1032 => Some(Self::UserJoin),
            1033 => Some(Self::UserLeave),
            1034 => Some(Self::StreamRegister),
            1035 => Some(Self::StreamData),
            1036 => Some(Self::Chat),
            1037 => Some(Self::PrivChat),
            1038 => Some(Self::GameCmd),
            1039 => Some(Self::VehicleData),
            1040 => Some(Self::UseVehicle),
            1041 => Some(Self::Delete),
            _ => None,
        }
    }

    /// Raw wire value.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Command {
    type Error = ProtocolError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::from_u32(raw).ok_or(ProtocolError::UnknownCommand(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip() {
        for raw in 1025..=1041 {
            let cmd = Command::from_u32(raw).expect("contiguous command space");
            assert_eq!(cmd.to_u32(), raw);
        }
    }

    #[test]
    fn unknown_values_rejected() {
        assert_eq!(Command::from_u32(0), None);
        assert_eq!(Command::from_u32(1024), None);
        assert_eq!(Command::from_u32(1042), None);
        assert!(Command::try_from(9999).is_err());
    }
}

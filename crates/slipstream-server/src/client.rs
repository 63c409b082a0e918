//! Per-client entry.
//!
//! One `ClientEntry` aggregates everything the server knows about a connected
//! client: identity, authorization, stream registry, traffic counters, and
//! the two socket workers. The client table owns each live entry; handing an
//! entry to the kill queue transfers ownership to the reaper, and nothing
//! else may touch it afterwards.

use std::{collections::HashMap, net::IpAddr};

use slipstream_proto::payloads::StreamRegistration;

use crate::{auth::AuthFlags, broadcaster::Broadcaster, receiver::Receiver, stats::StreamTraffic};

/// Most streams a single client may register; further registrations are
/// dropped without disconnecting the client.
pub const MAX_STREAMS: usize = 20;

/// Everything the server tracks for one connected client.
pub struct ClientEntry {
    /// Server-assigned identifier, unique for the process lifetime.
    pub uid: u32,
    /// Table index at admission time. Not stable across removals.
    pub slot: usize,
    /// Nickname, unique within the live table.
    pub nickname: String,
    /// Opaque identity token used for auth lookup.
    pub user_token: String,
    /// Authorization flags.
    pub auth: AuthFlags,
    /// Color number, unique within the live table.
    pub color: u32,
    /// Handshake complete; eligible for broadcast traffic.
    pub flow: bool,
    /// First stream-data frame seen; the announce burst has been sent.
    pub initialized: bool,
    /// Last known position. Maintained only when a script bridge is attached.
    pub position: Option<[f32; 3]>,
    /// Name of the first registered truck stream.
    pub vehicle_name: String,
    /// Peer address, used for ban matching and listings.
    pub peer_addr: IpAddr,
    /// Registered streams by client-chosen stream id.
    pub streams: HashMap<u32, StreamRegistration>,
    /// Per-stream traffic counters.
    pub traffic: HashMap<u32, StreamTraffic>,
    /// Egress queue and worker. Stopped first during teardown.
    pub broadcaster: Broadcaster,
    /// Ingress worker. Stopped second during teardown.
    pub receiver: Receiver,
}

impl ClientEntry {
    /// Auth letters for listings (`A`/`M`/`R`/`B`/`X`).
    #[must_use]
    pub fn auth_letters(&self) -> String {
        self.auth.letters()
    }
}

impl std::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("uid", &self.uid)
            .field("slot", &self.slot)
            .field("nickname", &self.nickname)
            .field("auth", &self.auth)
            .field("color", &self.color)
            .field("flow", &self.flow)
            .field("streams", &self.streams.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_entry(uid: u32, nickname: &str, color: u32) -> ClientEntry {
    ClientEntry {
        uid,
        slot: 0,
        nickname: nickname.to_string(),
        user_token: format!("token-{uid}"),
        auth: AuthFlags::empty(),
        color,
        flow: false,
        initialized: false,
        position: None,
        vehicle_name: String::new(),
        peer_addr: "127.0.0.1".parse().unwrap(),
        streams: HashMap::new(),
        traffic: HashMap::new(),
        broadcaster: Broadcaster::stub(uid),
        receiver: Receiver::stub(),
    }
}

//! In-memory ban list.
//!
//! Bans are keyed by peer IP and live for the lifetime of the process; there
//! is no persistence. Admission consults the list before adding an entry.

use std::net::IpAddr;

/// One ban, with enough context for the `!bans` listing.
#[derive(Debug, Clone)]
pub struct BanRecord {
    /// uid the banned client had when the ban was created.
    pub uid: u32,
    /// Peer address the ban matches on.
    pub ip: IpAddr,
    /// Nickname at ban time.
    pub nickname: String,
    /// Nickname of the moderator who issued the ban.
    pub banned_by: String,
    /// Reason given by the moderator.
    pub reason: String,
}

/// Process-lifetime ban list.
#[derive(Debug, Default)]
pub struct BanList {
    records: Vec<BanRecord>,
}

impl BanList {
    /// Empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a ban.
    pub fn add(&mut self, record: BanRecord) {
        tracing::debug!(uid = record.uid, ip = %record.ip, "adding ban, size: {}", self.records.len());
        self.records.push(record);
    }

    /// Remove the ban created for `uid`. `true` if one was removed.
    pub fn remove_uid(&mut self, uid: u32) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.uid != uid);
        before != self.records.len()
    }

    /// Whether `ip` matches any ban.
    #[must_use]
    pub fn is_banned(&self, ip: IpAddr) -> bool {
        self.records.iter().any(|r| r.ip == ip)
    }

    /// All bans, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &BanRecord> {
        self.records.iter()
    }

    /// Number of bans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

//! Master-list interface and the heartbeat occupancy snapshot.
//!
//! The HTTP client that talks to the master listing is an external
//! collaborator; this module defines the calls the core makes into it and
//! produces the textual occupancy document it periodically submits.

use std::{net::IpAddr, sync::Arc, time::Duration};

use crate::{auth::UserEventKind, sequencer::Sequencer};

/// Calls the core makes into the external listing client.
///
/// Implementations do their own I/O and retries; the core treats every call
/// as fire-and-forget and never blocks on one inside a critical section.
pub trait MasterListClient: Send + Sync {
    /// Register this server with the master list. `false` if rejected.
    fn register(&self, payload: String) -> bool;

    /// Update the standing registration.
    fn update(&self, payload: String) -> bool;

    /// Submit an occupancy heartbeat document.
    fn heartbeat(&self, snapshot: String);

    /// Drop the registration (shutdown).
    fn unregister(&self);

    /// Report a ranked-user lifecycle event.
    fn user_event(&self, token: String, kind: UserEventKind, nickname: String, extra: String);
}

/// One client row in the heartbeat document.
#[derive(Debug, Clone)]
pub struct HeartbeatRow {
    /// Current table slot.
    pub slot: usize,
    /// Vehicle name, empty until a truck stream is registered.
    pub vehicle: String,
    /// Nickname.
    pub nickname: String,
    /// Last known position, if tracked.
    pub position: Option<[f32; 3]>,
    /// Peer address.
    pub ip: IpAddr,
    /// Identity token.
    pub token: String,
    /// Auth flag letters.
    pub auth_letters: String,
}

/// Format the heartbeat document.
///
/// ```text
/// <challenge>
/// version4
/// <num_clients>
/// <slot>;<vehicle>;<nick>;<x,y,z>;<ip>;<token>;<auth_letters>
/// ```
#[must_use]
pub fn format_heartbeat(challenge: &str, num_clients: usize, rows: &[HeartbeatRow]) -> String {
    let mut doc = format!("{challenge}\nversion4\n{num_clients}\n");

    for row in rows {
        let position = row
            .position
            .map(|[x, y, z]| format!("{x:.2},{y:.2},{z:.2}"))
            .unwrap_or_default();
        doc.push_str(&format!(
            "{};{};{};{};{};{};{}\n",
            row.slot, row.vehicle, row.nickname, position, row.ip, row.token, row.auth_letters
        ));
    }

    doc
}

/// Periodically submit heartbeat documents to the listing client.
pub fn spawn_heartbeat(
    sequencer: Arc<Sequencer>,
    client: Arc<dyn MasterListClient>,
    challenge: String,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            client.heartbeat(sequencer.heartbeat_snapshot(&challenge));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_document_format() {
        let rows = vec![
            HeartbeatRow {
                slot: 0,
                vehicle: "rally.truck".to_string(),
                nickname: "alice".to_string(),
                position: Some([1.0, 2.5, -3.25]),
                ip: "10.1.2.3".parse().unwrap(),
                token: "tok-a".to_string(),
                auth_letters: "AM".to_string(),
            },
            HeartbeatRow {
                slot: 1,
                vehicle: String::new(),
                nickname: "bob".to_string(),
                position: None,
                ip: "10.1.2.4".parse().unwrap(),
                token: "tok-b".to_string(),
                auth_letters: String::new(),
            },
        ];

        let doc = format_heartbeat("challenge-123", 2, &rows);
        let lines: Vec<&str> = doc.lines().collect();

        assert_eq!(lines[0], "challenge-123");
        assert_eq!(lines[1], "version4");
        assert_eq!(lines[2], "2");
        assert_eq!(lines[3], "0;rally.truck;alice;1.00,2.50,-3.25;10.1.2.3;tok-a;AM");
        assert_eq!(lines[4], "1;;bob;;10.1.2.4;tok-b;");
    }
}

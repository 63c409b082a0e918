//! Admission scenarios: nickname dedup, capacity rejection, ban rejection.
//!
//! Each test ends with oracle checks on the sequencer's roster snapshot and
//! counters.

mod common;

use common::{admit, harness, harness_with_auth, try_admit, wait_until};
use slipstream_proto::{Command, SERVER_UID, payloads::UserJoinInfo};
use slipstream_server::{AuthFlags, ServerError, UserAuth};

#[tokio::test]
async fn duplicate_nickname_gets_a_counter() {
    let sequencer = harness(8);

    let mut first = admit(&sequencer, "alice", "t1").await;
    let mut second = admit(&sequencer, "alice", "t2").await;

    // Oracle: the table holds "alice" and "alice2".
    let nicks: Vec<String> =
        sequencer.client_views().into_iter().map(|v| v.nickname).collect();
    assert_eq!(nicks, vec!["alice", "alice2"]);

    // The first client saw its own join and then the newcomer's.
    let join = first.expect_command(Command::UserJoin).await;
    let info = *UserJoinInfo::from_payload(&join.payload).expect("join payload");
    assert_eq!(info.nickname(), "alice");

    let join = first.expect_command(Command::UserJoin).await;
    let info = *UserJoinInfo::from_payload(&join.payload).expect("join payload");
    assert_eq!(info.nickname(), "alice2");
    assert_eq!(join.header.source(), second.uid);

    // The second client saw the welcome (color payload) and its own join
    // under the deduplicated name.
    let welcome = second.expect_command(Command::Welcome).await;
    assert_eq!(welcome.payload.as_ref(), &1u32.to_le_bytes()[..]);

    let join = second.expect_command(Command::UserJoin).await;
    let info = *UserJoinInfo::from_payload(&join.payload).expect("join payload");
    assert_eq!(info.nickname(), "alice2");
}

#[tokio::test]
async fn full_server_rejects_with_full_frame() {
    let sequencer = harness(2);

    let _a = admit(&sequencer, "a", "t1").await;
    let _b = admit(&sequencer, "b", "t2").await;

    let (mut rejected, result) = try_admit(&sequencer, "c", "t3").await;
    assert!(matches!(result, Err(ServerError::ServerFull)));

    // The rejected client gets a ServerFull frame and then EOF.
    let frame = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        slipstream_server::wire::read_frame(&mut rejected),
    )
    .await
    .expect("frame within the rejection timeout")
    .expect("read rejection");
    assert_eq!(frame.command(), Some(Command::ServerFull));
    assert_eq!(frame.header.source(), SERVER_UID);

    let eof = slipstream_server::wire::read_frame(&mut rejected).await;
    assert!(eof.is_err(), "socket should be closed after rejection");

    // Oracle: the table never grew.
    assert_eq!(sequencer.client_count(), 2);
}

#[tokio::test]
async fn uids_monotonic_and_never_reused() {
    let sequencer = harness(4);

    let a = admit(&sequencer, "a", "t1").await;
    let b = admit(&sequencer, "b", "t2").await;
    assert!(b.uid > a.uid);

    let first_uid = a.uid;
    drop(a); // crash the first client
    wait_until("first client reaped", || sequencer.client_count() == 1).await;

    let c = admit(&sequencer, "c", "t3").await;
    assert!(c.uid > b.uid);
    assert_ne!(c.uid, first_uid);

    // Color 0 was freed and is reusable; the uid is not.
    let view = sequencer.client_view(c.uid).expect("c in table");
    assert_eq!(view.color, 0);
}

#[tokio::test]
async fn banned_address_rejected_before_entry_is_added() {
    let auth = UserAuth::from_entries(
        [("tmod".to_string(), AuthFlags::MOD, "mod".to_string())],
        None,
    );
    let sequencer = harness_with_auth(8, auth);

    let mut moderator = admit(&sequencer, "mod", "tmod").await;
    let mut guest = admit(&sequencer, "guest", "tg").await;
    let guest_uid = guest.uid;

    moderator.send(Command::Chat, 0, format!("!ban {guest_uid} swearing")).await;

    // The guest is kicked with the ban reason.
    let leave = guest.expect_command(Command::UserLeave).await;
    assert_eq!(leave.header.source(), guest_uid);
    assert_eq!(leave.text(), "kicked by mod: banned: swearing");

    wait_until("guest reaped", || sequencer.client_count() == 1).await;
    assert_eq!(sequencer.ban_count(), 1);

    // Reconnecting from the same (loopback) address is rejected with a
    // Banned frame; no entry is ever added.
    let (mut rejected, result) = try_admit(&sequencer, "guest", "tg").await;
    assert!(matches!(result, Err(ServerError::Banned(_))));

    let frame = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        slipstream_server::wire::read_frame(&mut rejected),
    )
    .await
    .expect("frame within the rejection timeout")
    .expect("read rejection");
    assert_eq!(frame.command(), Some(Command::Banned));

    assert_eq!(sequencer.client_count(), 1);
}

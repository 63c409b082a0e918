//! Dispatch pipeline scenarios: graceful and crashed disconnects, per-pair
//! chat ordering, the stream cap, the announce burst, private chat, and
//! script-bridge overrides.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::{admit, harness, harness_full, test_config, wait_until};
use slipstream_proto::{
    Command, SERVER_UID,
    payloads::{StreamKind, StreamRegistration, UserJoinInfo},
};
use slipstream_server::{BroadcastDecision, MAX_STREAMS, ScriptHost};

#[tokio::test]
async fn graceful_disconnect_notifies_with_user_leave() {
    let sequencer = harness(4);

    let mut u1 = admit(&sequencer, "u1", "t1").await;
    let mut u2 = admit(&sequencer, "u2", "t2").await;

    u1.send(Command::Delete, 0, Bytes::new()).await;

    let leave = u2.expect_command(Command::UserLeave).await;
    assert_eq!(leave.header.source(), u1.uid);
    assert_eq!(leave.text(), "disconnected on request");

    wait_until("u1 reaped", || sequencer.client_count() == 1).await;
    assert_eq!(sequencer.stats().conn_count(), 1);
    assert_eq!(sequencer.stats().conn_crash(), 0);
}

#[tokio::test]
async fn crashed_socket_notifies_with_delete() {
    let sequencer = harness(4);

    let u1 = admit(&sequencer, "u1", "t1").await;
    let mut u2 = admit(&sequencer, "u2", "t2").await;
    let u1_uid = u1.uid;

    drop(u1); // socket dies without a goodbye

    let delete = u2.expect_command(Command::Delete).await;
    assert_eq!(delete.header.source(), u1_uid);

    wait_until("u1 reaped", || sequencer.client_count() == 1).await;
    assert_eq!(sequencer.stats().conn_count(), 1);
    assert_eq!(sequencer.stats().conn_crash(), 1);
}

#[tokio::test]
async fn chat_is_delivered_in_sender_order() {
    let sequencer = harness(4);

    let mut u1 = admit(&sequencer, "u1", "t1").await;
    let mut u2 = admit(&sequencer, "u2", "t2").await;

    for i in 0..20 {
        u1.send(Command::Chat, 0, format!("msg {i}")).await;
    }

    // Per-pair FIFO: u2 observes u1's messages in send order.
    for i in 0..20 {
        let frame = u2.expect_command(Command::Chat).await;
        assert_eq!(frame.header.source(), u1.uid);
        assert_eq!(frame.text(), format!("msg {i}"));
    }

    // Chat broadcasts include the sender.
    let echo = u1.expect_command(Command::Chat).await;
    assert_eq!(echo.text(), "msg 0");

    assert_eq!(sequencer.chat_len(), 20);
}

#[tokio::test]
async fn stream_cap_drops_registrations_without_disconnect() {
    let sequencer = harness(4);

    let mut u1 = admit(&sequencer, "u1", "t1").await;
    let mut u2 = admit(&sequencer, "u2", "t2").await;

    for i in 0..(MAX_STREAMS as u32 + 5) {
        let reg = StreamRegistration::new(StreamKind::Truck, 0, &format!("truck{i}"));
        u1.send(Command::StreamRegister, i, reg.to_bytes().to_vec()).await;
    }
    u1.send(Command::Chat, 0, "done").await;

    // u2 sees exactly the accepted registrations, then the chat marker.
    let mut registered = 0;
    loop {
        let frame = u2.read_frame().await;
        match frame.command() {
            Some(Command::StreamRegister) => registered += 1,
            Some(Command::Chat) => break,
            _ => {},
        }
    }
    assert_eq!(registered, MAX_STREAMS);

    // The sender is still connected with a full stream registry.
    let view = sequencer.client_view(u1.uid).expect("u1 still in table");
    assert_eq!(view.stream_count, MAX_STREAMS);
    assert_eq!(sequencer.client_count(), 2);
}

#[tokio::test]
async fn first_stream_data_triggers_announce_burst() {
    let sequencer = harness(4);

    let mut u1 = admit(&sequencer, "u1", "t1").await;
    let mut u2 = admit(&sequencer, "u2", "t2").await;

    // u1 registers a vehicle before u2 starts sending.
    let reg = StreamRegistration::new(StreamKind::Truck, 0, "rally.truck");
    u1.send(Command::StreamRegister, 7, reg.to_bytes().to_vec()).await;
    wait_until("registration stored", || {
        sequencer.client_view(u1.uid).is_some_and(|v| v.stream_count == 1)
    })
    .await;

    // u2's first stream data frame makes the server replay the roster.
    u2.send(Command::StreamData, 1, vec![0u8; 16]).await;

    let mut saw_u1_info = false;
    let mut saw_own_info = false;
    let mut saw_u1_stream = false;
    for _ in 0..8 {
        let frame = u2.read_frame().await;
        match frame.command() {
            Some(Command::UserInfo) => {
                let info = *UserJoinInfo::from_payload(&frame.payload).expect("roster row");
                if frame.header.source() == u1.uid {
                    assert_eq!(info.nickname(), "u1");
                    saw_u1_info = true;
                } else if frame.header.source() == u2.uid {
                    assert_eq!(info.nickname(), "u2");
                    saw_own_info = true;
                }
            },
            Some(Command::StreamRegister) => {
                assert_eq!(frame.header.source(), u1.uid);
                assert_eq!(frame.header.stream_id(), 7);
                saw_u1_stream = true;
            },
            _ => {},
        }
        if saw_u1_info && saw_own_info && saw_u1_stream {
            break;
        }
    }
    assert!(saw_u1_info && saw_own_info && saw_u1_stream, "announce burst incomplete");

    // u1 learns about u2 via UserInfo, and then receives the relayed data.
    let info = u1.expect_command(Command::UserInfo).await;
    assert_eq!(info.header.source(), u2.uid);

    let data = u1.expect_command(Command::StreamData).await;
    assert_eq!(data.header.source(), u2.uid);
    assert_eq!(data.header.stream_id(), 1);

    let view = sequencer.client_view(u2.uid).expect("u2 in table");
    assert!(view.initialized);
}

#[tokio::test]
async fn private_chat_reaches_target_only() {
    let sequencer = harness(4);

    let mut u1 = admit(&sequencer, "u1", "t1").await;
    let mut u2 = admit(&sequencer, "u2", "t2").await;
    let mut u3 = admit(&sequencer, "u3", "t3").await;

    let mut payload = u2.uid.to_le_bytes().to_vec();
    payload.extend_from_slice(b"psst");
    u1.send(Command::PrivChat, 0, payload).await;

    let private = u2.expect_command(Command::Chat).await;
    assert_eq!(private.header.source(), u1.uid);
    assert_eq!(private.text(), "psst");

    // u3 sees nothing private; a public marker arrives first.
    u1.send(Command::Chat, 0, "public").await;
    let frame = u3.expect_command(Command::Chat).await;
    assert_eq!(frame.text(), "public");
}

#[tokio::test]
async fn script_can_block_chat_broadcast() {
    let script = Arc::new(ScriptHost::new());
    script.set_player_chat(|_, text| {
        if text.contains("secret") { BroadcastDecision::Block } else { BroadcastDecision::Auto }
    });
    let sequencer = harness_full(test_config(4), None, Some(script));

    let mut u1 = admit(&sequencer, "u1", "t1").await;
    let mut u2 = admit(&sequencer, "u2", "t2").await;

    u1.send(Command::Chat, 0, "the secret word").await;
    u1.send(Command::Chat, 0, "hello").await;

    // The blocked line never arrives; the next one does.
    let frame = u2.expect_command(Command::Chat).await;
    assert_eq!(frame.text(), "hello");

    // Both lines were still recorded in the history ring.
    assert_eq!(sequencer.chat_len(), 2);
}

#[tokio::test]
async fn player_deleted_hook_sees_the_departing_client() {
    let script = Arc::new(ScriptHost::new());
    let sequencer = harness_full(test_config(4), None, Some(Arc::clone(&script)));

    // The hook fires before the entry leaves the table; a roster query from
    // inside the callback must still find the departing client.
    let observed = Arc::new(std::sync::Mutex::new(None));
    {
        let sequencer = Arc::clone(&sequencer);
        let observed = Arc::clone(&observed);
        script.add_player_deleted(move |uid, crashed| {
            let visible = sequencer.client_view(uid).is_some();
            *observed.lock().unwrap() = Some((visible, crashed));
        });
    }

    let mut u1 = admit(&sequencer, "u1", "t1").await;
    let _u2 = admit(&sequencer, "u2", "t2").await;
    let u1_uid = u1.uid;

    u1.send(Command::Delete, 0, Bytes::new()).await;
    wait_until("u1 reaped", || sequencer.client_count() == 1).await;

    assert_eq!(*observed.lock().unwrap(), Some((true, false)));
    assert!(sequencer.client_view(u1_uid).is_none());
}

#[tokio::test]
async fn server_origin_frames_use_the_sentinel_uid() {
    let sequencer = harness(4);

    let mut u1 = admit(&sequencer, "u1", "t1").await;
    sequencer.server_say("hello there", Some(u1.uid), slipstream_server::SayKind::Server);

    let frame = u1.expect_command(Command::Chat).await;
    assert_eq!(frame.header.source(), SERVER_UID);
    assert_eq!(frame.text(), "SERVER: hello there");
}

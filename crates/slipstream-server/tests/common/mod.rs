//! Shared harness for the loopback scenario tests.
//!
//! Tests drive the sequencer the way the listener does — real TCP sockets,
//! real receiver/broadcaster workers, real reaper — skipping only the
//! version/credentials handshake, which belongs to the listener.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use slipstream_proto::{Command, Frame, payloads::UserCredentials};
use slipstream_server::{
    ScriptHost, ServerConfig, ServerError, UserAuth, reaper, sequencer::Sequencer, wire,
};
use tokio::net::{TcpListener, TcpStream};

/// Sequencer with a running reaper and no collaborators.
pub fn harness(max_clients: usize) -> Arc<Sequencer> {
    harness_full(test_config(max_clients), None, None)
}

/// Sequencer with a running reaper and an auth index.
pub fn harness_with_auth(max_clients: usize, auth: UserAuth) -> Arc<Sequencer> {
    harness_full(test_config(max_clients), Some(auth), None)
}

/// Fully parameterized harness.
pub fn harness_full(
    config: ServerConfig,
    auth: Option<UserAuth>,
    script: Option<Arc<ScriptHost>>,
) -> Arc<Sequencer> {
    let sequencer = Sequencer::new(config, auth, None, script);
    reaper::spawn(Arc::clone(&sequencer));
    sequencer
}

/// Config suitable for tests: no MOTD file, no stats spam.
pub fn test_config(max_clients: usize) -> ServerConfig {
    ServerConfig {
        max_clients,
        motd_file: "/nonexistent/motd.txt".into(),
        print_stats: false,
        ..ServerConfig::default()
    }
}

/// A connected TCP pair over loopback.
pub async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");

    let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.expect("connect"), server.expect("accept").0)
}

/// Client side of one admitted connection.
pub struct TestClient {
    pub stream: TcpStream,
    pub uid: u32,
}

impl TestClient {
    /// Read the next frame, failing the test after five seconds.
    pub async fn read_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), wire::read_frame(&mut self.stream))
            .await
            .expect("timed out waiting for a frame")
            .expect("read frame")
    }

    /// Read frames until one matches `command`.
    pub async fn expect_command(&mut self, command: Command) -> Frame {
        loop {
            let frame = self.read_frame().await;
            if frame.command() == Some(command) {
                return frame;
            }
        }
    }

    /// Send a frame with this client's uid as source.
    pub async fn send(&mut self, command: Command, stream_id: u32, payload: impl Into<Bytes>) {
        let frame = Frame::new(command, self.uid, stream_id, payload);
        wire::write_frame(&mut self.stream, &frame).await.expect("write frame");
    }
}

/// Run admission for `nick`/`token`; returns the client socket and outcome.
pub async fn try_admit(
    sequencer: &Arc<Sequencer>,
    nick: &str,
    token: &str,
) -> (TcpStream, Result<u32, ServerError>) {
    let (client_sock, server_sock) = tcp_pair().await;
    let creds = UserCredentials::new(nick, token);
    let result = sequencer.create_client(server_sock, &creds).await;
    (client_sock, result)
}

/// Admit a client and open its flow gate, as the listener would.
pub async fn admit(sequencer: &Arc<Sequencer>, nick: &str, token: &str) -> TestClient {
    let (stream, result) = try_admit(sequencer, nick, token).await;
    let uid = result.expect("admission should succeed");
    sequencer.enable_flow(uid);
    TestClient { stream, uid }
}

/// Poll until `cond` holds, failing the test after five seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

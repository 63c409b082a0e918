//! TCP accept loop and the per-connection handshake.
//!
//! Each accepted socket gets its own handshake task: the client opens with
//! Hello carrying its protocol version, the server answers with its settings
//! blob, the client presents credentials, and the sequencer takes over for
//! admission. Once admitted the client's flow gate opens and the message of
//! the day is streamed.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use slipstream_proto::{
    Command, Frame, PROTOCOL_VERSION, SERVER_STREAM, SERVER_UID,
    payloads::{ServerSettings, UserCredentials},
};
use tokio::net::{TcpListener, TcpStream};

use crate::{error::ServerError, sequencer::Sequencer, wire};

/// Budget for each handshake step. Slow clients are cut loose, not waited on.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections until the listener socket dies.
pub async fn run(sequencer: Arc<Sequencer>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                let sequencer = Arc::clone(&sequencer);
                tokio::spawn(async move {
                    if let Err(e) = handshake(sequencer, socket, addr).await {
                        tracing::debug!(%addr, error = %e, "handshake failed");
                    }
                });
            },
            Err(e) => {
                tracing::error!(error = %e, "accept error");
            },
        }
    }
}

async fn handshake(
    sequencer: Arc<Sequencer>,
    mut socket: TcpStream,
    addr: SocketAddr,
) -> Result<(), ServerError> {
    let hello = read_step(&mut socket).await?;
    if hello.command() != Some(Command::Hello) {
        return Err(ServerError::Handshake("expected hello".to_string()));
    }

    let version = hello.text();
    if version != PROTOCOL_VERSION {
        tracing::warn!(%addr, version, "wrong protocol version");
        let reject = Frame::new(Command::WrongVersion, SERVER_UID, SERVER_STREAM, Vec::new());
        let _ = wire::write_frame(&mut socket, &reject).await;
        return Ok(());
    }

    let settings =
        ServerSettings::new(PROTOCOL_VERSION, &sequencer.config().server_name);
    let reply = Frame::new(
        Command::ServerSettings,
        SERVER_UID,
        SERVER_STREAM,
        settings.to_bytes().to_vec(),
    );
    wire::write_frame(&mut socket, &reply).await?;

    let info = read_step(&mut socket).await?;
    if info.command() != Some(Command::UserInfo) {
        return Err(ServerError::Handshake("expected credentials".to_string()));
    }
    let creds = *UserCredentials::from_payload(&info.payload)?;

    tracing::debug!(%addr, username = %creds.username(), "handshake complete");

    let uid = sequencer.create_client(socket, &creds).await?;
    sequencer.enable_flow(uid);
    sequencer.send_motd(uid);

    Ok(())
}

async fn read_step(socket: &mut TcpStream) -> Result<Frame, ServerError> {
    tokio::time::timeout(HANDSHAKE_TIMEOUT, wire::read_frame(socket))
        .await
        .map_err(|_| ServerError::Handshake("timed out".to_string()))?
}

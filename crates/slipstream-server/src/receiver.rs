//! Per-client ingress worker.
//!
//! Reads frames off one socket read half and hands each to the sequencer's
//! dispatch. The worker exits on socket error or protocol violation, in both
//! cases dooming its client first. The blocking read is cancellable only by
//! aborting the task, which drops the read half and closes the socket — the
//! reaper does exactly that.

use std::sync::Arc;

use bytes::Bytes;
use slipstream_proto::FrameHeader;
use tokio::{io::AsyncReadExt, net::tcp::OwnedReadHalf, task::JoinHandle};

use crate::sequencer::Sequencer;

/// Handle to one client's ingress worker.
pub struct Receiver {
    worker: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Spawn the worker for a freshly admitted client.
    #[must_use]
    pub fn spawn(uid: u32, reader: OwnedReadHalf, sequencer: Arc<Sequencer>) -> Self {
        Self { worker: Some(tokio::spawn(run(uid, reader, sequencer))) }
    }

    /// Abort the worker and wait for it to finish, dropping the read half.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
            let _ = worker.await;
        }
    }

    /// Handle with no worker, for entries whose socket is already gone.
    #[cfg(test)]
    pub(crate) fn stub() -> Self {
        Self { worker: None }
    }
}

async fn run(uid: u32, mut reader: OwnedReadHalf, sequencer: Arc<Sequencer>) {
    let mut header_buf = [0u8; FrameHeader::SIZE];

    loop {
        if let Err(e) = reader.read_exact(&mut header_buf).await {
            tracing::debug!(uid, error = %e, "socket read failed");
            sequencer.disconnect(uid, "network error", true);
            return;
        }

        let header = match FrameHeader::from_bytes(&header_buf) {
            Ok(header) => *header,
            Err(e) => {
                tracing::warn!(uid, error = %e, "protocol violation");
                sequencer.disconnect(uid, "protocol violation", true);
                return;
            },
        };

        let Some(command) = header.command() else {
            tracing::warn!(uid, command = header.command_raw(), "unknown command");
            sequencer.disconnect(uid, "protocol violation", true);
            return;
        };

        let mut payload = vec![0u8; header.payload_size() as usize];
        if let Err(e) = reader.read_exact(&mut payload).await {
            tracing::debug!(uid, error = %e, "socket read failed mid-frame");
            sequencer.disconnect(uid, "network error", true);
            return;
        }

        let is_goodbye = command == slipstream_proto::Command::Delete;
        sequencer.dispatch(uid, command, header.stream_id(), Bytes::from(payload));

        if is_goodbye {
            // The entry is already on the kill queue; stop reading.
            return;
        }
    }
}

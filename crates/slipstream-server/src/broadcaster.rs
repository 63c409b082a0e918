//! Per-client egress worker.
//!
//! Each client owns a bounded FIFO of pending frames and a background worker
//! that drains it to the socket write half. Dispatch enqueues with `try_send`;
//! a full queue counts a drop on the destination's accounting and discards
//! the frame, so one slow client can never wedge dispatch to the others.
//!
//! A write failure dooms the owning client via `Sequencer::disconnect`.

use std::{sync::Arc, time::Duration};

use bytes::BytesMut;
use slipstream_proto::Frame;
use tokio::{io::AsyncWriteExt, net::tcp::OwnedWriteHalf, sync::mpsc, task::JoinHandle};

use crate::sequencer::Sequencer;

/// How long the reaper waits for the worker to drain before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to one client's egress queue and worker.
pub struct Broadcaster {
    uid: u32,
    tx: Option<mpsc::Sender<Frame>>,
    worker: Option<JoinHandle<()>>,
}

impl Broadcaster {
    /// Spawn the worker for a freshly admitted client.
    #[must_use]
    pub fn spawn(
        uid: u32,
        writer: OwnedWriteHalf,
        queue_depth: usize,
        sequencer: Arc<Sequencer>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth);
        let worker = tokio::spawn(run(uid, writer, rx, sequencer));

        Self { uid, tx: Some(tx), worker: Some(worker) }
    }

    /// Enqueue a frame for delivery.
    ///
    /// Never blocks. Returns `false` if the frame was discarded because the
    /// queue is full or the broadcaster has been stopped; the caller accounts
    /// the drop.
    pub fn queue_frame(&self, frame: Frame) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.try_send(frame).is_ok())
    }

    /// Stop the worker: refuse new frames, let queued ones drain, then join.
    ///
    /// Closing the channel lets the worker finish any in-flight write and
    /// drain the queue before exiting; a worker stuck on a wedged socket is
    /// aborted after [`STOP_TIMEOUT`].
    pub async fn stop(&mut self) {
        self.tx = None;

        if let Some(mut worker) = self.worker.take() {
            if tokio::time::timeout(STOP_TIMEOUT, &mut worker).await.is_err() {
                tracing::warn!(uid = self.uid, "broadcaster did not drain in time; aborting");
                worker.abort();
                let _ = worker.await;
            }
        }
    }

    /// Handle with no worker, for entries whose socket is already gone.
    /// Every enqueue reports a drop.
    #[cfg(test)]
    pub(crate) fn stub(uid: u32) -> Self {
        Self { uid, tx: None, worker: None }
    }
}

async fn run(
    uid: u32,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Frame>,
    sequencer: Arc<Sequencer>,
) {
    let mut buf = BytesMut::with_capacity(4096);

    while let Some(frame) = rx.recv().await {
        buf.clear();
        if let Err(e) = frame.encode(&mut buf) {
            tracing::warn!(uid, error = %e, "dropping unencodable frame");
            continue;
        }

        if let Err(e) = writer.write_all(&buf).await {
            tracing::debug!(uid, error = %e, "write failed");
            sequencer.disconnect(uid, "error sending message", true);
            break;
        }
    }

    // Channel closed (teardown) or write failure: announce EOF to the peer.
    let _ = writer.shutdown().await;
}

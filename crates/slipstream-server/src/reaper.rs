//! The reaper: deferred, ordered client teardown.
//!
//! `disconnect` is callable from any task, including a client's own receiver
//! or broadcaster worker — a task must never destroy the entry it is
//! executing inside of. So disconnect only removes the entry from the table
//! and hands it to this dedicated worker, which performs the teardown in a
//! fixed order.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{client::ClientEntry, sequencer::Sequencer};

/// Start the reaper worker.
pub fn spawn(sequencer: Arc<Sequencer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("reaper ready");
        loop {
            match sequencer.pop_doomed() {
                Some(entry) => reap(entry).await,
                None => sequencer.doomed_notified().await,
            }
        }
    })
}

/// Tear one entry down.
///
/// The order is a hard invariant: stop the broadcaster first so nothing can
/// write into a socket that is going away, then stop the receiver (aborting
/// it unblocks the pending read and drops the read half), at which point
/// both socket halves are gone and the connection is closed; finally the
/// entry itself is released. The reaper is infallible from the core's view —
/// a worker that will not die is aborted and the entry is freed regardless,
/// so a stuck socket can never leak a roster slot.
async fn reap(mut entry: ClientEntry) {
    tracing::debug!(uid = entry.uid, nickname = %entry.nickname, "reaping client");

    entry.broadcaster.stop().await;
    entry.receiver.stop().await;

    drop(entry);
}

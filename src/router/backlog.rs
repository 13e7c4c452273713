//! Credit counter bounding the replies a connection owes its peer.
//!
//! Every decoded chunk yields exactly one reply, so the reader takes one
//! credit per chunk and the writer returns credits once the replies have
//! been flushed to the socket. A peer that stops reading stops the writer,
//! which in turn stops the reader.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Replies accepted for a connection but not yet written.
#[derive(Debug)]
pub(super) struct ReplyBacklog {
    pending: AtomicUsize,
    limit: usize,
    writer_done: AtomicBool,
    drained: Notify,
}

impl ReplyBacklog {
    /// A backlog admitting reads while fewer than `limit` replies are owed.
    pub(super) fn new(limit: usize) -> Self {
        Self {
            pending: AtomicUsize::new(0),
            limit: limit.max(1),
            writer_done: AtomicBool::new(false),
            drained: Notify::new(),
        }
    }

    /// Record one reply the writer will eventually flush.
    pub(super) fn add(&self) { self.pending.fetch_add(1, Ordering::AcqRel); }

    /// Return `n` credits after their replies reached the socket.
    pub(super) fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                Some(pending.saturating_sub(n))
            });
        self.drained.notify_waiters();
    }

    /// The writer has exited; nothing will be released again.
    pub(super) fn close(&self) {
        self.writer_done.store(true, Ordering::Release);
        self.drained.notify_waiters();
    }

    pub(super) fn pending(&self) -> usize { self.pending.load(Ordering::Acquire) }

    pub(super) fn has_room(&self) -> bool {
        self.writer_done.load(Ordering::Acquire) || self.pending() < self.limit
    }

    /// Wait until another read is allowed.
    ///
    /// Returns immediately once the writer has exited so the reader can
    /// observe the failure on its own.
    pub(super) async fn wait_for_room(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and
            // the await is not missed.
            notified.as_mut().enable();
            if self.has_room() {
                return;
            }
            notified.await;
        }
    }
}

//! Per-connection request handling.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::protocol::{Reply, Request};
use crate::{
    id::ConnectionId,
    join::{CallbackJoin, JoinAggregator, JoinOutcome},
    pipeline::{Executor, LaneToken, Visitable},
};

/// Item carried by a connection's request pipeline.
#[derive(Debug)]
pub enum Inbound {
    /// A chunk that decoded as a request.
    Request(Request),
    /// A chunk that did not decode, with the decoder's diagnostic.
    Malformed(String),
}

impl Visitable<RouterVisitor> for Inbound {
    fn accept(self, visitor: &RouterVisitor) {
        match self {
            Inbound::Request(Request::Ping { nonce }) => visitor.reply(Reply::Pong { nonce }),
            Inbound::Request(Request::Echo { body }) => visitor.reply(Reply::Echo { body }),
            Inbound::Request(Request::Batch { id, items }) => visitor.visit_batch(id, items),
            Inbound::Malformed(reason) => visitor.reply(Reply::Rejected { reason }),
        }
    }
}

/// Counts of batch items by result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    /// Items processed successfully.
    pub accepted: u32,
    /// Items that failed.
    pub rejected: u32,
}

/// Sums item tallies and keeps the first failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct TallyAggregator;

impl JoinAggregator<Tally, String> for TallyAggregator {
    fn callback_done(
        &self,
        aggregate: &mut JoinOutcome<Tally, String>,
        completion: Result<Tally, String>,
        _is_last: bool,
    ) {
        let tally = aggregate.result.get_or_insert_with(Tally::default);
        match completion {
            Ok(item) => {
                tally.accepted += item.accepted;
                tally.rejected += item.rejected;
            }
            Err(reason) => {
                tally.rejected += 1;
                aggregate.success = false;
                aggregate.error.get_or_insert(reason);
            }
        }
    }
}

/// Validate one batch item.
fn process_item(item: &[u8]) -> Result<Tally, String> {
    if item.is_empty() {
        return Err("empty batch item".to_owned());
    }
    Ok(Tally {
        accepted: 1,
        rejected: 0,
    })
}

/// Handles the requests of one connection.
///
/// Replies are pushed to the connection's writer through an unbounded
/// channel; once every clone of the sender is gone the writer finishes.
pub struct RouterVisitor {
    connection: ConnectionId,
    replies: UnboundedSender<Reply>,
    executor: Arc<dyn Executor>,
    batch_lanes: Vec<LaneToken>,
}

impl std::fmt::Debug for RouterVisitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterVisitor")
            .field("connection", &self.connection)
            .field("batch_lanes", &self.batch_lanes.len())
            .finish_non_exhaustive()
    }
}

impl RouterVisitor {
    /// Create a visitor for `connection`, running batch items on
    /// `batch_lanes` lanes of `executor`.
    #[must_use]
    pub fn new(
        connection: ConnectionId,
        replies: UnboundedSender<Reply>,
        executor: Arc<dyn Executor>,
        batch_lanes: usize,
    ) -> Self {
        let batch_lanes = (0..batch_lanes.max(1))
            .map(|n| LaneToken::from(format!("{connection}/batch-{n}")))
            .collect();
        Self {
            connection,
            replies,
            executor,
            batch_lanes,
        }
    }

    /// Connection this visitor serves.
    #[must_use]
    pub fn connection(&self) -> ConnectionId { self.connection }

    fn reply(&self, reply: Reply) {
        if self.replies.send(reply).is_err() {
            debug!(connection = %self.connection, "reply dropped, writer gone");
        }
    }

    fn visit_batch(&self, id: u64, items: Vec<Vec<u8>>) {
        let replies = self.replies.clone();
        let connection = self.connection;
        let join = Arc::new(CallbackJoin::with_aggregator(
            TallyAggregator,
            move |outcome: JoinOutcome<Tally, String>| {
                let tally = outcome.result.unwrap_or_default();
                let reply = Reply::BatchDone {
                    id,
                    accepted: tally.accepted,
                    rejected: tally.rejected,
                    first_error: outcome.error,
                };
                if replies.send(reply).is_err() {
                    debug!(%connection, batch = id, "batch reply dropped, writer gone");
                }
            },
        ));

        for (item, lane) in items.into_iter().zip(self.batch_lanes.iter().cycle()) {
            let member = join.register();
            self.executor.dispatch(
                Box::new(move || {
                    if member.complete(process_item(&item)).is_err() {
                        warn!(batch = id, "batch member overran its join");
                    }
                }),
                lane,
            );
        }
        join.set_blocked(false);
    }
}

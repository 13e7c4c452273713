//! Metric helpers for `relaycore`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::panic::PanicSite;

/// Name of the gauge tracking active router connections.
pub const CONNECTIONS_ACTIVE: &str = "relaycore_connections_active";
/// Name of the counter tracking completed chunks.
pub const CHUNKS_PROCESSED: &str = "relaycore_chunks_processed_total";
/// Name of the counter tracking framing violations.
pub const FRAMING_ERRORS: &str = "relaycore_framing_errors_total";
/// Name of the counter tracking items accepted by work queues.
pub const ITEMS_ENQUEUED: &str = "relaycore_items_enqueued_total";
/// Name of the counter tracking items discarded by work queues.
pub const ITEMS_DROPPED: &str = "relaycore_items_dropped_total";
/// Name of the counter tracking caught task panics, labelled by site.
pub const TASK_PANICS: &str = "relaycore_task_panics_total";

/// Direction of chunk processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Chunks decoded by a reader.
    Inbound,
    /// Chunks encoded by a writer.
    Outbound,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Why a queue discarded items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Pending items discarded by `close`.
    Closed,
    /// Unprotected items discarded by `clear`.
    Cleared,
    /// Items offered after the queue was closed.
    AfterClose,
}

impl DropReason {
    /// Label value used for this reason.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::Closed => "closed",
            DropReason::Cleared => "cleared",
            DropReason::AfterClose => "after_close",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a completed chunk for the given direction.
pub fn inc_chunks(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(CHUNKS_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a framing violation.
pub fn inc_framing_errors() {
    #[cfg(feature = "metrics")]
    counter!(FRAMING_ERRORS).increment(1);
}

/// Record an item accepted by a queue.
pub fn inc_enqueued() {
    #[cfg(feature = "metrics")]
    counter!(ITEMS_ENQUEUED).increment(1);
}

/// Record `count` items discarded by a queue.
pub fn add_dropped(reason: DropReason, count: usize) {
    #[cfg(feature = "metrics")]
    counter!(ITEMS_DROPPED, "reason" => reason.as_str()).increment(count as u64);
    #[cfg(not(feature = "metrics"))]
    let _ = (reason, count);
}

/// Record a panic caught at `site`.
pub fn inc_task_panics(site: PanicSite) {
    #[cfg(feature = "metrics")]
    counter!(TASK_PANICS, "site" => site.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = site;
}

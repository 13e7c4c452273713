//! Reporting for panics caught at task boundaries.
//!
//! Lane tasks and connection tasks are both run under `catch_unwind`; a
//! panic there is logged and counted here, and the surrounding pool or
//! accept loop keeps running.

use std::{any::Any, fmt};

use tracing::error;

use crate::metrics;

/// Placeholder logged for payloads that carry no message.
pub const OPAQUE_PAYLOAD: &str = "<non-string panic payload>";

/// Boundary at which a panic was caught.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanicSite {
    /// A task dispatched to a [`LanePool`](crate::pipeline::LanePool) lane.
    Lane,
    /// A router connection task.
    Connection,
}

impl PanicSite {
    /// Label value used for this site.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PanicSite::Lane => "lane",
            PanicSite::Connection => "connection",
        }
    }
}

/// Message carried by a panic payload.
///
/// `panic!` produces `&'static str` or `String` payloads; anything else
/// yields [`OPAQUE_PAYLOAD`].
///
/// ```
/// use relaycore::panic::{OPAQUE_PAYLOAD, panic_message};
///
/// let caught = std::panic::catch_unwind(|| panic!("lane {} failed", 3)).expect_err("panics");
/// assert_eq!(panic_message(&*caught), "lane 3 failed");
/// assert_eq!(panic_message(&5_u32), OPAQUE_PAYLOAD);
/// ```
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&'static str>().copied())
        .unwrap_or(OPAQUE_PAYLOAD)
}

/// Log and count a panic caught at `site` while running `subject`, the lane
/// or connection the task belonged to.
pub fn report_panic(site: PanicSite, subject: &dyn fmt::Display, payload: &(dyn Any + Send)) {
    metrics::inc_task_panics(site);
    error!(
        site = site.as_str(),
        %subject,
        panic = panic_message(payload),
        "task panicked"
    );
}

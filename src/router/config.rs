//! Configuration for the demonstration router.

use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use crate::{frame::FrameConfig, queue::QueueConfig};

/// Default TCP port the router binary listens on.
pub const DEFAULT_PORT: u16 = 7878;

/// Number of lanes batch items are spread across per connection.
pub const DEFAULT_BATCH_LANES: usize = 4;

/// Replies a connection may owe its peer before reads pause.
pub const DEFAULT_MAX_PENDING_REPLIES: usize = 1024;

/// Exponential back-off applied when `accept()` fails.
///
/// The delay starts at `initial_delay` and doubles on each consecutive
/// failure, capped at `max_delay`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay used for the first retry after an `accept()` failure.
    pub initial_delay: Duration,
    /// Maximum delay once retries have increased exponentially.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Clamp both delays to at least one millisecond and order them.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use relaycore::router::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::ZERO,
    /// };
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }
}

/// Everything a router needs besides its listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    /// Address the binary binds.
    pub listen: SocketAddr,
    /// Limits for inbound and outbound chunks.
    pub frame: FrameConfig,
    /// Sizing of each connection's request pipeline.
    pub queue: QueueConfig,
    /// Lanes batch items are spread across per connection.
    pub batch_lanes: usize,
    /// Replies owed to a peer before its connection stops reading.
    pub max_pending_replies: usize,
    /// Accept-loop retry timing.
    pub backoff: BackoffConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            frame: FrameConfig::default(),
            queue: QueueConfig::default(),
            batch_lanes: DEFAULT_BATCH_LANES,
            max_pending_replies: DEFAULT_MAX_PENDING_REPLIES,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Replace the listen address.
    #[must_use]
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Replace the frame limits.
    #[must_use]
    pub fn with_frame(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    /// Replace the pipeline sizing.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Replace the batch lane count; zero is raised to one.
    #[must_use]
    pub fn with_batch_lanes(mut self, lanes: usize) -> Self {
        self.batch_lanes = lanes.max(1);
        self
    }

    /// Replace the reply backlog limit; zero is raised to one.
    #[must_use]
    pub fn with_max_pending_replies(mut self, limit: usize) -> Self {
        self.max_pending_replies = limit.max(1);
        self
    }
}

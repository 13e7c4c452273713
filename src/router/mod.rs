//! Demonstration router tying the codec, pipelines and joins together.
//!
//! Each accepted connection gets a [`FrameReader`](crate::frame::FrameReader)
//! on its read half, a [`DrainingPipelineQueue`](crate::pipeline::DrainingPipelineQueue)
//! on a lane named after the connection, and a writer task draining a
//! [`FrameWriter`](crate::frame::FrameWriter) into the write half. Reads pause
//! once [`RouterConfig::max_pending_replies`] replies are still unwritten,
//! which bounds what a peer that never reads can cost. Batch
//! requests fan out across the shared [`LanePool`] and converge through a
//! [`CallbackJoin`](crate::join::CallbackJoin).

mod backlog;
pub mod client;
pub mod config;
mod connection;
pub mod protocol;
pub mod visitor;

use std::sync::Arc;

pub use client::RouterClient;
pub use config::{
    BackoffConfig,
    DEFAULT_BATCH_LANES,
    DEFAULT_MAX_PENDING_REPLIES,
    DEFAULT_PORT,
    RouterConfig,
};
use connection::{RouterContext, spawn_connection};
pub use protocol::{Reply, Request};
use tokio::{net::TcpListener, select, time::sleep};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, warn};
pub use visitor::{Inbound, RouterVisitor, Tally, TallyAggregator};

use crate::{error::Result, id::IdGenerator, pipeline::LanePool};

/// Bind `config.listen`.
///
/// # Errors
///
/// Returns an I/O error if the address cannot be bound.
pub async fn bind(config: &RouterConfig) -> Result<TcpListener> {
    Ok(TcpListener::bind(config.listen).await?)
}

/// Accept connections on `listener` until `shutdown` is cancelled.
///
/// Connections still open at shutdown stop reading, finish the requests they
/// already received, and flush their replies before this returns.
///
/// # Errors
///
/// Returns an I/O error if called outside a tokio runtime.
pub async fn serve(listener: TcpListener, config: RouterConfig, shutdown: CancellationToken) -> Result<()> {
    let pool = LanePool::current().map_err(std::io::Error::other)?;
    let backoff = config.backoff.normalized();
    let ctx = Arc::new(RouterContext {
        config,
        pool,
        ids: IdGenerator::new(),
    });
    let tracker = TaskTracker::new();
    info!(addr = ?listener.local_addr().ok(), "router accepting connections");

    let mut delay = backoff.initial_delay;
    loop {
        select! {
            biased;

            () = shutdown.cancelled() => break,
            res = listener.accept() => match res {
                Ok((stream, _)) => {
                    spawn_connection(stream, &ctx, &shutdown, &tracker);
                    delay = backoff.initial_delay;
                }
                Err(e) => {
                    warn!(error = %e, "accept error");
                    sleep(delay).await;
                    delay = (delay * 2).min(backoff.max_delay);
                }
            },
        }
    }

    tracker.close();
    tracker.wait().await;
    ctx.pool.wait_idle().await;
    info!("router stopped");
    Ok(())
}

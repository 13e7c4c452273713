//! Per-connection driver for the router.

use std::{net::SocketAddr, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::mpsc::{self, UnboundedReceiver},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, trace, warn};

use super::{
    RouterConfig,
    backlog::ReplyBacklog,
    protocol::{Reply, Request},
    visitor::{Inbound, RouterVisitor},
};
use crate::{
    error::{RelayError, Result},
    frame::{ChunkListener, FrameConfig, FrameReader, FrameWriter},
    id::{ConnectionId, IdGenerator},
    message::Message,
    metrics,
    panic::{PanicSite, report_panic},
    pipeline::{DrainingPipelineQueue, Executor, LanePool},
    transport::{self, ReadStatus},
};

/// State shared by the accept loop and every connection task.
pub(super) struct RouterContext {
    pub config: RouterConfig,
    pub pool: LanePool,
    pub ids: IdGenerator,
}

type RequestPipeline = DrainingPipelineQueue<Inbound, RouterVisitor>;

/// Decodes completed chunks and feeds them to the request pipeline.
struct RequestListener {
    pipeline: RequestPipeline,
    backlog: Arc<ReplyBacklog>,
}

impl ChunkListener for RequestListener {
    fn on_chunk_complete(&mut self, chunk: &[u8]) {
        let item = match Request::from_bytes(chunk) {
            Ok((request, used)) if used == chunk.len() => Inbound::Request(request),
            Ok((_, used)) => Inbound::Malformed(format!(
                "{} trailing bytes after request",
                chunk.len() - used
            )),
            Err(e) => {
                debug!(error = %e, "undecodable request");
                Inbound::Malformed(e.to_string())
            }
        };
        self.backlog.add();
        self.pipeline.enqueue(item);
    }
}

/// Spawn a task serving `stream`, logging and discarding any panic.
pub(super) fn spawn_connection(
    stream: TcpStream,
    ctx: &Arc<RouterContext>,
    shutdown: &CancellationToken,
    tracker: &TaskTracker,
) {
    let id = ctx.ids.next_id();
    let peer = stream.peer_addr().ok();
    let ctx = Arc::clone(ctx);
    let shutdown = shutdown.clone();
    tracker.spawn(async move {
        metrics::inc_connections();
        debug!(%id, ?peer, "connection accepted");
        let task = AssertUnwindSafe(handle_connection(stream, id, &ctx, shutdown)).catch_unwind();
        match task.await {
            Ok(Ok(())) => debug!(%id, ?peer, "connection closed"),
            Ok(Err(e)) => log_failure(id, peer, &e),
            Err(panic) => report_panic(PanicSite::Connection, &id, &*panic),
        }
        ctx.pool.prune_idle();
        metrics::dec_connections();
    });
}

fn log_failure(id: ConnectionId, peer: Option<SocketAddr>, e: &RelayError) {
    if e.is_protocol_violation() {
        warn!(%id, ?peer, error = %e, "connection dropped after protocol violation");
    } else {
        warn!(%id, ?peer, error = %e, "connection failed");
    }
}

async fn handle_connection(
    stream: TcpStream,
    id: ConnectionId,
    ctx: &RouterContext,
    shutdown: CancellationToken,
) -> Result<()> {
    let config = &ctx.config;
    let (mut read_half, write_half) = stream.into_split();
    let (replies, reply_rx) = mpsc::unbounded_channel();
    let executor: Arc<dyn Executor> = Arc::new(ctx.pool.clone());
    let visitor = Arc::new(RouterVisitor::new(
        id,
        replies,
        Arc::clone(&executor),
        config.batch_lanes,
    ));
    let pipeline: RequestPipeline = DrainingPipelineQueue::builder(executor, id.to_string(), visitor)
        .config(config.queue)
        .build();
    let backlog = Arc::new(ReplyBacklog::new(config.max_pending_replies));
    let writer = tokio::spawn(write_replies(
        write_half,
        reply_rx,
        config.frame,
        Arc::clone(&backlog),
    ));

    let mut reader = FrameReader::new(
        config.frame,
        RequestListener {
            pipeline: pipeline.clone(),
            backlog: Arc::clone(&backlog),
        },
    );
    let read_result = select! {
        biased;

        () = shutdown.cancelled() => {
            debug!(%id, "shutdown requested, no longer reading");
            Ok(())
        }
        res = read_requests(&mut read_half, &mut reader, &backlog) => res,
    };
    if read_result.is_err() {
        pipeline.close();
    }
    // Replies end once the pipeline and any pending batch joins release
    // their senders.
    drop(reader);
    drop(pipeline);

    let written = writer.await.map_err(std::io::Error::other)?;
    read_result?;
    let chunks = written?;
    debug!(%id, chunks, "replies flushed");
    Ok(())
}

/// Read chunks until a clean EOF, pausing while the reply backlog is full.
async fn read_requests(
    io: &mut OwnedReadHalf,
    reader: &mut FrameReader<RequestListener>,
    backlog: &ReplyBacklog,
) -> Result<()> {
    loop {
        if !backlog.has_room() {
            trace!(pending = backlog.pending(), "reply backlog full, pausing reads");
        }
        backlog.wait_for_room().await;
        if transport::read_once(io, reader).await? == ReadStatus::Eof {
            transport::check_eof(reader)?;
            debug!(chunks = reader.chunks_read(), "stream closed at chunk boundary");
            return Ok(());
        }
    }
}

async fn write_replies(
    io: OwnedWriteHalf,
    replies: UnboundedReceiver<Reply>,
    config: FrameConfig,
    backlog: Arc<ReplyBacklog>,
) -> Result<u64> {
    let written = drain_replies(io, replies, config, &backlog).await;
    backlog.close();
    written
}

async fn drain_replies(
    mut io: OwnedWriteHalf,
    mut replies: UnboundedReceiver<Reply>,
    config: FrameConfig,
    backlog: &ReplyBacklog,
) -> Result<u64> {
    let mut writer = FrameWriter::new(config);
    while let Some(reply) = replies.recv().await {
        stage_reply(&mut writer, &reply)?;
        let mut staged = 1;
        while let Ok(reply) = replies.try_recv() {
            stage_reply(&mut writer, &reply)?;
            staged += 1;
        }
        transport::flush_fragments(&mut io, &mut writer).await?;
        backlog.release(staged);
    }
    io.shutdown().await?;
    Ok(writer.chunks_written())
}

fn stage_reply(writer: &mut FrameWriter, reply: &Reply) -> Result<()> {
    let bytes = reply.to_bytes()?;
    if let Err(e) = writer.write(&bytes) {
        warn!(error = %e, "reply exceeds chunk limit, dropped");
        return Ok(());
    }
    writer.mark_chunk_completed()?;
    Ok(())
}

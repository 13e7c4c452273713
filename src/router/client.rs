//! Minimal client speaking the router protocol.

use std::{collections::VecDeque, net::SocketAddr};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use super::protocol::{Reply, Request};
use crate::{
    error::Result,
    frame::{ChunkListener, FrameConfig, FrameReader, FrameWriter},
    message::Message,
    transport::{self, ReadStatus},
};

#[derive(Debug, Default)]
struct ReplyBuffer {
    chunks: VecDeque<Vec<u8>>,
}

impl ChunkListener for ReplyBuffer {
    fn on_chunk_complete(&mut self, chunk: &[u8]) { self.chunks.push_back(chunk.to_vec()); }
}

/// Client over any byte stream, sending [`Request`]s and reading
/// [`Reply`]s in arrival order.
#[derive(Debug)]
pub struct RouterClient<S = TcpStream> {
    stream: S,
    reader: FrameReader<ReplyBuffer>,
    writer: FrameWriter,
}

impl RouterClient<TcpStream> {
    /// Connect to a router at `addr`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the connection cannot be established.
    pub async fn connect(addr: SocketAddr, config: FrameConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream, config))
    }
}

impl<S> RouterClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established stream.
    pub fn new(stream: S, config: FrameConfig) -> Self {
        Self {
            stream,
            reader: FrameReader::new(config, ReplyBuffer::default()),
            writer: FrameWriter::new(config),
        }
    }

    /// Encode `request` as one chunk and write it out.
    ///
    /// # Errors
    ///
    /// Returns a framing error if the encoded request exceeds the chunk
    /// limit, or an encode or I/O error.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        self.writer.write(&request.to_bytes()?)?;
        self.writer.mark_chunk_completed()?;
        transport::flush_fragments(&mut self.stream, &mut self.writer).await?;
        Ok(())
    }

    /// Wait for the next reply. Returns `None` when the router closes the
    /// stream at a chunk boundary.
    ///
    /// # Errors
    ///
    /// Returns an I/O, framing or decode error, or an EOF error if the router
    /// closes part way through a chunk.
    pub async fn recv(&mut self) -> Result<Option<Reply>> {
        loop {
            if let Some(chunk) = self.reader.listener_mut().chunks.pop_front() {
                let (reply, _) = Reply::from_bytes(&chunk)?;
                return Ok(Some(reply));
            }
            if transport::read_once(&mut self.stream, &mut self.reader).await? == ReadStatus::Eof {
                transport::check_eof(&self.reader)?;
                return Ok(None);
            }
        }
    }

    /// Send raw bytes, bypassing the framing codec.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the stream.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Close the write half so the router sees end of stream.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the stream.
    pub async fn finish(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

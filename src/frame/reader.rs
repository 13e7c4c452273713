//! Length-prefixed chunk decoder.
//!
//! [`FrameReader`] is a two-state machine driven by the transport: it exposes
//! the buffer the next read should land in via [`FrameReader::target`], and
//! the transport reports how many bytes arrived with
//! [`FrameReader::set_bytes_written`]. Completed chunks are handed to a
//! [`ChunkListener`] synchronously from inside that call.
//!
//! The body buffer of the last chunk is retained. When the next chunk
//! declares exactly the same length the buffer is reused instead of
//! reallocated, which keeps steady traffic of uniform chunk sizes
//! allocation-free.

use tracing::{trace, warn};

use super::{FrameConfig, FramingError};
use crate::{
    byte_order::{LENGTH_PREFIX_SIZE, decode_length_prefix},
    metrics::{self, Direction},
};

/// Receives chunks as the reader completes them.
///
/// Implementations must not block: the callback runs inside the byte delivery
/// call of the connection's I/O driver.
pub trait ChunkListener {
    /// Called with the complete body of a chunk.
    fn on_chunk_complete(&mut self, chunk: &[u8]);
}

impl<F> ChunkListener for F
where
    F: FnMut(&[u8]),
{
    fn on_chunk_complete(&mut self, chunk: &[u8]) { self(chunk) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadState {
    ReadLength,
    ReadBody { length: usize },
}

/// Incremental decoder for `u32` big-endian length-prefixed chunks.
///
/// A reader belongs to one connection and is driven by one I/O callback at a
/// time; the `&mut self` API makes that discipline a compile-time property.
///
/// # Examples
///
/// ```
/// use relaycore::frame::{FrameConfig, FrameReader};
///
/// let mut chunks = Vec::new();
/// let mut reader = FrameReader::new(FrameConfig::default(), |chunk: &[u8]| {
///     chunks.push(chunk.to_vec());
/// });
/// reader
///     .feed(&[0, 0, 0, 2, b'h', b'i'])
///     .expect("well-formed stream");
/// drop(reader);
/// assert_eq!(chunks, vec![b"hi".to_vec()]);
/// ```
#[derive(Debug)]
pub struct FrameReader<L> {
    config: FrameConfig,
    listener: L,
    state: ReadState,
    prefix: [u8; LENGTH_PREFIX_SIZE],
    offset: usize,
    body: Vec<u8>,
    poisoned: bool,
    chunks_read: u64,
    buffers_reused: u64,
}

impl<L: ChunkListener> FrameReader<L> {
    /// Create a reader delivering chunks to `listener`.
    #[must_use]
    pub fn new(config: FrameConfig, listener: L) -> Self {
        Self {
            config,
            listener,
            state: ReadState::ReadLength,
            prefix: [0; LENGTH_PREFIX_SIZE],
            offset: 0,
            body: Vec::new(),
            poisoned: false,
            chunks_read: 0,
            buffers_reused: 0,
        }
    }

    /// Buffer the next transport read should fill.
    ///
    /// The slice is never empty while the reader is healthy. After a framing
    /// error it is empty and [`set_bytes_written`](Self::set_bytes_written)
    /// reports [`FramingError::Poisoned`].
    pub fn target(&mut self) -> &mut [u8] {
        if self.poisoned {
            return &mut [];
        }
        match self.state {
            ReadState::ReadLength => &mut self.prefix[self.offset..],
            ReadState::ReadBody { length } => &mut self.body[self.offset..length],
        }
    }

    /// Record that the transport wrote `written` bytes into [`target`](Self::target).
    ///
    /// Returns the number of chunks completed by this call (zero or one).
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::Overrun`] if `written` exceeds the exposed
    /// buffer, [`FramingError::EmptyChunk`] or
    /// [`FramingError::OversizedChunk`] for an invalid length prefix, and
    /// [`FramingError::Poisoned`] once any of those has occurred.
    pub fn set_bytes_written(&mut self, written: usize) -> Result<usize, FramingError> {
        if self.poisoned {
            return Err(FramingError::Poisoned);
        }
        let available = self.remaining();
        if written > available {
            return Err(self.poison(FramingError::Overrun { written, available }));
        }
        self.offset += written;

        match self.state {
            ReadState::ReadLength if self.offset == LENGTH_PREFIX_SIZE => {
                let length = decode_length_prefix(self.prefix) as usize;
                self.begin_body(length)?;
                Ok(0)
            }
            ReadState::ReadBody { length } if self.offset == length => {
                self.listener.on_chunk_complete(&self.body[..length]);
                self.state = ReadState::ReadLength;
                self.offset = 0;
                self.chunks_read += 1;
                metrics::inc_chunks(Direction::Inbound);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    /// Copy `bytes` through the state machine.
    ///
    /// Convenience for transports that already hold the data in a buffer of
    /// their own. Returns the number of chunks completed.
    ///
    /// # Errors
    ///
    /// Propagates the first [`FramingError`] raised while consuming `bytes`.
    pub fn feed(&mut self, mut bytes: &[u8]) -> Result<usize, FramingError> {
        let mut completed = 0;
        while !bytes.is_empty() {
            let target = self.target();
            if target.is_empty() {
                return Err(FramingError::Poisoned);
            }
            let n = target.len().min(bytes.len());
            target[..n].copy_from_slice(&bytes[..n]);
            bytes = &bytes[n..];
            completed += self.set_bytes_written(n)?;
        }
        Ok(completed)
    }

    fn begin_body(&mut self, length: usize) -> Result<(), FramingError> {
        if length == 0 {
            return Err(self.poison(FramingError::EmptyChunk));
        }
        let max = self.config.max_chunk_len();
        if length > max {
            return Err(self.poison(FramingError::OversizedChunk { size: length, max }));
        }
        if self.body.len() == length {
            self.buffers_reused += 1;
        } else {
            self.body = vec![0; length];
        }
        trace!(length, "chunk header decoded");
        self.state = ReadState::ReadBody { length };
        self.offset = 0;
        Ok(())
    }

    fn poison(&mut self, error: FramingError) -> FramingError {
        warn!(%error, "framing error, reader poisoned");
        metrics::inc_framing_errors();
        self.poisoned = true;
        error
    }

    fn remaining(&self) -> usize {
        match self.state {
            ReadState::ReadLength => LENGTH_PREFIX_SIZE - self.offset,
            ReadState::ReadBody { length } => length - self.offset,
        }
    }
}

impl<L> FrameReader<L> {
    /// Whether the reader sits on a chunk boundary with nothing buffered.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.state == ReadState::ReadLength && self.offset == 0 }

    /// Whether a framing error has made the reader unusable.
    #[must_use]
    pub fn is_poisoned(&self) -> bool { self.poisoned }

    /// Length of the chunk currently being read, once its prefix is known.
    #[must_use]
    pub fn pending_chunk_len(&self) -> Option<usize> {
        match self.state {
            ReadState::ReadLength => None,
            ReadState::ReadBody { length } => Some(length),
        }
    }

    /// Bytes received for the current header or body so far.
    #[must_use]
    pub fn buffered(&self) -> usize { self.offset }

    /// Total chunks delivered to the listener.
    #[must_use]
    pub fn chunks_read(&self) -> u64 { self.chunks_read }

    /// Number of chunks whose body buffer was recycled from the previous one.
    #[must_use]
    pub fn buffers_reused(&self) -> u64 { self.buffers_reused }

    /// Limits this reader enforces.
    #[must_use]
    pub fn config(&self) -> &FrameConfig { &self.config }

    /// Borrow the listener.
    #[must_use]
    pub fn listener(&self) -> &L { &self.listener }

    /// Mutably borrow the listener.
    pub fn listener_mut(&mut self) -> &mut L { &mut self.listener }

    /// Consume the reader, returning its listener.
    pub fn into_listener(self) -> L { self.listener }
}

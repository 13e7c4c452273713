//! Fragmenting chunk encoder for non-blocking socket writes.
//!
//! Bytes written to a [`FrameWriter`] are staged in fixed-size blocks. When
//! the caller marks the chunk complete, the length prefix is patched into
//! the first block and the blocks become the chunk's fragments, queued in
//! order behind any chunk still being sent. The transport repeatedly asks
//! for the [`current_fragment`](FrameWriter::current_fragment), writes what
//! it can, and reports progress with
//! [`set_bytes_written`](FrameWriter::set_bytes_written). Consumed blocks
//! are recycled for later chunks.

use std::{collections::VecDeque, io};

use tracing::trace;

use super::{FrameConfig, FramingError};
use crate::{
    byte_order::{LENGTH_PREFIX_SIZE, encode_length_prefix},
    metrics::{self, Direction},
};

/// Upper bound on recycled blocks kept after a large chunk drains.
const SPARE_BLOCK_LIMIT: usize = 16;

#[derive(Debug)]
struct Fragment {
    bytes: Vec<u8>,
    last: bool,
}

/// Encoder producing `u32` big-endian length-prefixed chunks as fragments.
///
/// # Examples
///
/// ```
/// use relaycore::frame::{FrameConfig, FrameWriter};
///
/// let mut writer = FrameWriter::new(FrameConfig::default().with_fragment_size(16));
/// writer.write(&[7; 20]).expect("within limits");
/// assert_eq!(writer.mark_chunk_completed().expect("non-empty"), 2);
///
/// let mut wire = Vec::new();
/// while let Some(fragment) = writer.current_fragment() {
///     wire.extend_from_slice(fragment);
///     let n = fragment.len();
///     writer.set_bytes_written(n).expect("whole fragment");
/// }
/// assert_eq!(&wire[..4], &[0, 0, 0, 20]);
/// assert_eq!(wire.len(), 24);
/// ```
#[derive(Debug)]
pub struct FrameWriter {
    config: FrameConfig,
    staging: Vec<Vec<u8>>,
    staged_len: usize,
    ready: VecDeque<Fragment>,
    offset: usize,
    spare: Vec<Vec<u8>>,
    chunks_written: u64,
}

impl FrameWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            staging: Vec::new(),
            staged_len: 0,
            ready: VecDeque::new(),
            offset: 0,
            spare: Vec::new(),
            chunks_written: 0,
        }
    }

    /// Append body bytes to the chunk under construction.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::OversizedChunk`] if the staged chunk would
    /// exceed the configured maximum. The rejected bytes are not staged.
    pub fn write(&mut self, mut bytes: &[u8]) -> Result<(), FramingError> {
        let size = self.staged_len + bytes.len();
        let max = self.config.max_chunk_len();
        if size > max {
            return Err(FramingError::OversizedChunk { size, max });
        }
        if self.staging.is_empty() {
            let mut first = self.take_block();
            first.extend_from_slice(&[0; LENGTH_PREFIX_SIZE]);
            self.staging.push(first);
        }
        let fragment_size = self.config.fragment_size();
        while !bytes.is_empty() {
            if self
                .staging
                .last()
                .is_none_or(|block| block.len() == fragment_size)
            {
                let block = self.take_block();
                self.staging.push(block);
            }
            let Some(block) = self.staging.last_mut() else {
                break;
            };
            let n = (fragment_size - block.len()).min(bytes.len());
            block.extend_from_slice(&bytes[..n]);
            bytes = &bytes[n..];
            self.staged_len += n;
        }
        Ok(())
    }

    /// Append a single byte to the chunk under construction.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn put_u8(&mut self, byte: u8) -> Result<(), FramingError> { self.write(&[byte]) }

    /// Finalise the staged chunk into fragments.
    ///
    /// Returns the number of fragments the chunk occupies. The read cursor
    /// points at the chunk's first fragment once every earlier chunk has been
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::EmptyChunk`] if nothing was staged.
    pub fn mark_chunk_completed(&mut self) -> Result<usize, FramingError> {
        if self.staged_len == 0 {
            self.recycle_staging();
            return Err(FramingError::EmptyChunk);
        }
        let length = u32::try_from(self.staged_len).map_err(|_| FramingError::OversizedChunk {
            size: self.staged_len,
            max: self.config.max_chunk_len(),
        })?;
        if let Some(first) = self.staging.first_mut() {
            first[..LENGTH_PREFIX_SIZE].copy_from_slice(&encode_length_prefix(length));
        }
        let count = self.staging.len();
        for (index, bytes) in self.staging.drain(..).enumerate() {
            self.ready.push_back(Fragment {
                bytes,
                last: index + 1 == count,
            });
        }
        trace!(length, fragments = count, "chunk completed");
        self.staged_len = 0;
        Ok(count)
    }

    /// Unsent remainder of the fragment currently in flight.
    #[must_use]
    pub fn current_fragment(&self) -> Option<&[u8]> {
        self.ready
            .front()
            .map(|fragment| &fragment.bytes[self.offset..])
    }

    /// Record that the transport accepted `written` bytes of the current fragment.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::Overrun`] if `written` exceeds the unsent
    /// remainder of the current fragment.
    pub fn set_bytes_written(&mut self, written: usize) -> Result<(), FramingError> {
        let available = self.current_fragment().map_or(0, <[u8]>::len);
        if written > available {
            return Err(FramingError::Overrun { written, available });
        }
        self.offset += written;
        if written > 0 && self.offset == self.ready.front().map_or(0, |f| f.bytes.len()) {
            if let Some(done) = self.ready.pop_front() {
                if done.last {
                    self.chunks_written += 1;
                    metrics::inc_chunks(Direction::Outbound);
                }
                self.recycle(done.bytes);
            }
            self.offset = 0;
        }
        Ok(())
    }

    /// Number of fragments not yet fully written.
    #[must_use]
    pub fn chunk_count(&self) -> usize { self.ready.len() }

    /// Whether completed fragments are waiting for the transport.
    #[must_use]
    pub fn has_pending(&self) -> bool { !self.ready.is_empty() }

    /// Body bytes staged for the chunk under construction.
    #[must_use]
    pub fn staged_len(&self) -> usize { self.staged_len }

    /// Total chunks fully handed to the transport.
    #[must_use]
    pub fn chunks_written(&self) -> u64 { self.chunks_written }

    /// Limits this writer enforces.
    #[must_use]
    pub fn config(&self) -> &FrameConfig { &self.config }

    /// Discard staged and pending data.
    pub fn reset(&mut self) {
        self.recycle_staging();
        while let Some(fragment) = self.ready.pop_front() {
            self.recycle(fragment.bytes);
        }
        self.offset = 0;
    }

    fn take_block(&mut self) -> Vec<u8> {
        self.spare
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.config.fragment_size()))
    }

    fn recycle(&mut self, mut block: Vec<u8>) {
        if self.spare.len() < SPARE_BLOCK_LIMIT {
            block.clear();
            self.spare.push(block);
        }
    }

    fn recycle_staging(&mut self) {
        let staged = std::mem::take(&mut self.staging);
        for block in staged {
            self.recycle(block);
        }
        self.staged_len = 0;
    }
}

impl io::Write for FrameWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FrameWriter::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

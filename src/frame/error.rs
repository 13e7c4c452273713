//! Error types for the chunk framing layer.
//!
//! Framing errors are fatal for the connection that produced them: the
//! reader never tries to resynchronise a corrupted stream, so callers are
//! expected to close the transport once one surfaces.

use std::io;

use thiserror::Error;

/// Wire-level framing failures raised by [`FrameReader`](super::FrameReader)
/// and [`FrameWriter`](super::FrameWriter).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The declared or written chunk length exceeds the configured ceiling.
    #[error("chunk exceeds max length: {size} > {max}")]
    OversizedChunk {
        /// Length declared by the prefix, or produced by the writer.
        size: usize,
        /// Configured maximum chunk length.
        max: usize,
    },

    /// A zero length prefix, or an attempt to complete an empty chunk.
    #[error("empty chunk not permitted")]
    EmptyChunk,

    /// The transport reported more bytes than the exposed buffer could hold.
    #[error("transport reported {written} bytes but only {available} were available")]
    Overrun {
        /// Bytes the transport claims to have written or read.
        written: usize,
        /// Bytes that were actually exposed.
        available: usize,
    },

    /// A previous error left the reader in an unusable state.
    #[error("reader poisoned by an earlier framing error")]
    Poisoned,
}

impl From<FramingError> for io::Error {
    fn from(error: FramingError) -> Self { io::Error::new(io::ErrorKind::InvalidData, error) }
}

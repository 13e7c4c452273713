//! Canonical error and result types for the transport and router layers.

use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

use crate::{frame::FramingError, transport::EofError};

/// Top-level error type exposed by `relaycore`.
///
/// Queue and join operations report their own narrow errors; this type
/// covers everything that can end a connection.
#[derive(Debug, Error)]
pub enum RelayError {
    /// An error in the underlying transport (for example, a socket reset).
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    /// The peer violated the length-prefixed framing.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    /// The peer closed the stream part way through a chunk.
    #[error("premature end of stream: {0}")]
    Eof(#[from] EofError),
    /// A chunk body did not decode as a request.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// A reply could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
}

impl RelayError {
    /// Returns true if this error indicates the peer misbehaved, as opposed
    /// to a local or transport failure.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Framing(_) | Self::Eof(_) | Self::Decode(_))
    }
}

/// Canonical result alias used by `relaycore` public APIs.
pub type Result<T> = std::result::Result<T, RelayError>;

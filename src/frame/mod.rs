//! Length-prefixed chunk framing.
//!
//! A chunk travels as a 4-byte big-endian length followed by exactly that
//! many body bytes. [`FrameReader`] carves an inbound byte stream into
//! chunks and [`FrameWriter`] turns outbound chunks into bounded fragments
//! suitable for partial, non-blocking socket writes. Both are owned by a
//! single connection and are not internally synchronised.

pub mod config;
pub mod error;
pub mod reader;
pub mod writer;

pub use config::{
    DEFAULT_FRAGMENT_SIZE,
    DEFAULT_MAX_CHUNK_LEN,
    FrameConfig,
    MAX_CHUNK_LEN,
    MIN_FRAGMENT_SIZE,
};
pub use error::FramingError;
pub use reader::{ChunkListener, FrameReader};
pub use writer::FrameWriter;

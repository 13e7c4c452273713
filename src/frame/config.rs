//! Size limits shared by the chunk reader and writer.

use static_assertions::const_assert;

use crate::byte_order::LENGTH_PREFIX_SIZE;

/// Smallest fragment the writer will produce.
///
/// Fragment sizes passed to [`FrameConfig`] are clamped to at least this
/// value so a length prefix always fits inside the first fragment.
pub const MIN_FRAGMENT_SIZE: usize = 16;

/// Default fragment size used for socket writes (8 KiB).
pub const DEFAULT_FRAGMENT_SIZE: usize = 8 * 1024;

/// Default ceiling on a single chunk body (16 MiB).
pub const DEFAULT_MAX_CHUNK_LEN: usize = 16 * 1024 * 1024;

/// Largest chunk body the 4-byte length prefix can describe.
pub const MAX_CHUNK_LEN: usize = u32::MAX as usize;

const_assert!(MIN_FRAGMENT_SIZE >= LENGTH_PREFIX_SIZE);
const_assert!(DEFAULT_FRAGMENT_SIZE >= MIN_FRAGMENT_SIZE);
const_assert!(DEFAULT_MAX_CHUNK_LEN <= MAX_CHUNK_LEN);

/// Limits applied to a single connection's framing.
///
/// `max_chunk_len` bounds the body length a peer may declare; a reader
/// rejects anything larger before allocating, which keeps a malformed or
/// hostile peer from exhausting memory with a single prefix.
/// `fragment_size` is the block size the writer carves outgoing chunks into.
///
/// # Examples
///
/// ```
/// use relaycore::frame::{FrameConfig, MIN_FRAGMENT_SIZE};
///
/// let config = FrameConfig::default().with_fragment_size(1);
/// assert_eq!(config.fragment_size(), MIN_FRAGMENT_SIZE);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameConfig {
    max_chunk_len: usize,
    fragment_size: usize,
}

impl FrameConfig {
    /// Construct a configuration, clamping both values into their valid ranges.
    #[must_use]
    pub fn new(max_chunk_len: usize, fragment_size: usize) -> Self {
        Self {
            max_chunk_len: max_chunk_len.clamp(1, MAX_CHUNK_LEN),
            fragment_size: fragment_size.max(MIN_FRAGMENT_SIZE),
        }
    }

    /// Replace the maximum chunk length.
    #[must_use]
    pub fn with_max_chunk_len(self, max_chunk_len: usize) -> Self {
        Self::new(max_chunk_len, self.fragment_size)
    }

    /// Replace the fragment size.
    #[must_use]
    pub fn with_fragment_size(self, fragment_size: usize) -> Self {
        Self::new(self.max_chunk_len, fragment_size)
    }

    /// Largest chunk body accepted or produced.
    #[must_use]
    pub const fn max_chunk_len(&self) -> usize { self.max_chunk_len }

    /// Block size used when fragmenting outgoing chunks.
    #[must_use]
    pub const fn fragment_size(&self) -> usize { self.fragment_size }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
        }
    }
}

//! Bincode serialisation for router requests and replies.

use bincode::{
    BorrowDecode,
    Encode,
    borrow_decode_from_slice,
    config::{self, Configuration, Limit},
    encode_to_vec,
    error::{DecodeError, EncodeError},
};

use crate::frame::DEFAULT_MAX_CHUNK_LEN;

/// Ceiling on the bytes a single decode may claim for lengths declared inside
/// a message.
///
/// Chunk bodies come from peers, and bincode sizes containers from the length
/// a body declares before reading it. Without a ceiling a ten-byte body can
/// demand terabytes. Messages whose containers need more than this fail with
/// [`DecodeError::LimitExceeded`].
pub const DECODE_LIMIT: usize = DEFAULT_MAX_CHUNK_LEN;

type DecodeConfig = Configuration<config::LittleEndian, config::Varint, Limit<DECODE_LIMIT>>;

const fn decode_config() -> DecodeConfig { config::standard().with_limit::<DECODE_LIMIT>() }

/// Wrapper trait for message types carried in chunk bodies.
///
/// Any type deriving [`Encode`] and [`BorrowDecode`] implements this trait
/// through a blanket implementation. Encoding uses bincode's standard
/// configuration; decoding adds the [`DECODE_LIMIT`] ceiling.
pub trait Message: Encode + for<'de> BorrowDecode<'de, ()> {
    /// Serialise the message into a byte vector.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if serialisation fails.
    fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> { encode_to_vec(self, config::standard()) }

    /// Deserialise a message from a chunk body, returning the message and
    /// the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if deserialisation fails, including
    /// [`DecodeError::LimitExceeded`] when the body declares containers
    /// larger than [`DECODE_LIMIT`].
    fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), DecodeError>
    where
        Self: Sized,
    {
        borrow_decode_from_slice(bytes, decode_config())
    }
}

impl<T> Message for T where for<'de> T: Encode + BorrowDecode<'de, ()> {}

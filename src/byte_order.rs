//! Network byte-order helpers for the chunk length prefix.
//!
//! The framing layer only ever needs the 4-byte big-endian length field, so
//! the conversions live here with their lint expectations scoped to the
//! single call site.

/// Width of the length prefix that precedes every chunk on the wire.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Serialise a chunk length in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use relaycore::byte_order::encode_length_prefix;
///
/// assert_eq!(encode_length_prefix(0x0001_0203), [0x00, 0x01, 0x02, 0x03]);
/// ```
#[must_use]
pub fn encode_length_prefix(length: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "The chunk length prefix is defined as big-endian."
    )]
    length.to_be_bytes()
}

/// Parse a chunk length from its on-wire representation.
///
/// # Examples
///
/// ```
/// use relaycore::byte_order::decode_length_prefix;
///
/// assert_eq!(decode_length_prefix([0x00, 0x00, 0x01, 0x00]), 256);
/// ```
#[must_use]
pub fn decode_length_prefix(bytes: [u8; LENGTH_PREFIX_SIZE]) -> u32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "The chunk length prefix is defined as big-endian."
    )]
    u32::from_be_bytes(bytes)
}

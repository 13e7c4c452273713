//! Helpers for driving the chunk codec without a socket.

use relaycore::frame::{ChunkListener, FrameReader, FrameWriter, FramingError};

/// Listener that keeps a copy of every chunk and the address of the buffer
/// it was delivered in.
#[derive(Debug, Default)]
pub struct CollectingListener {
    chunks: Vec<Vec<u8>>,
    addresses: Vec<usize>,
}

impl CollectingListener {
    /// Chunks delivered so far.
    #[must_use]
    pub fn chunks(&self) -> &[Vec<u8>] { &self.chunks }

    /// Address of the reader's buffer for each delivered chunk, for buffer
    /// reuse assertions.
    #[must_use]
    pub fn addresses(&self) -> &[usize] { &self.addresses }

    /// Consume the listener, returning the chunks.
    #[must_use]
    pub fn into_chunks(self) -> Vec<Vec<u8>> { self.chunks }
}

impl ChunkListener for CollectingListener {
    fn on_chunk_complete(&mut self, chunk: &[u8]) {
        self.addresses.push(chunk.as_ptr() as usize);
        self.chunks.push(chunk.to_vec());
    }
}

/// Encode `bodies` as they appear on the wire: a 4-byte big-endian length
/// before each body.
///
/// # Panics
///
/// Panics if a body is longer than `u32::MAX` bytes.
#[must_use]
pub fn encode_chunks(bodies: &[&[u8]]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(bodies.iter().map(|body| body.len() + 4).sum());
    for body in bodies {
        let len = u32::try_from(body.len()).expect("body fits a u32 prefix");
        wire.extend_from_slice(&len.to_be_bytes());
        wire.extend_from_slice(body);
    }
    wire
}

/// Feed `wire` to `reader` through its target buffer, never delivering more
/// than `step` bytes per call. Returns the number of chunks completed.
///
/// # Errors
///
/// Propagates the first [`FramingError`] raised by the reader.
///
/// # Panics
///
/// Panics if `step` is zero.
pub fn drip_feed<L: ChunkListener>(
    reader: &mut FrameReader<L>,
    mut wire: &[u8],
    step: usize,
) -> Result<usize, FramingError> {
    assert!(step > 0, "step must be positive");
    let mut chunks = 0;
    while !wire.is_empty() {
        let target = reader.target();
        let n = target.len().min(step).min(wire.len());
        target[..n].copy_from_slice(&wire[..n]);
        chunks += reader.set_bytes_written(n)?;
        wire = &wire[n..];
    }
    Ok(chunks)
}

/// Drain every ready fragment from `writer`, accepting at most `step` bytes
/// per write to mimic short socket writes. Returns the bytes and the
/// fragment boundaries observed.
///
/// # Panics
///
/// Panics if `step` is zero.
pub fn drain_writer(writer: &mut FrameWriter, step: usize) -> (Vec<u8>, Vec<usize>) {
    assert!(step > 0, "step must be positive");
    let mut wire = Vec::new();
    let mut fragments = Vec::new();
    let mut current = 0;
    while let Some(fragment) = writer.current_fragment() {
        let before = writer.chunk_count();
        let n = fragment.len().min(step);
        wire.extend_from_slice(&fragment[..n]);
        writer
            .set_bytes_written(n)
            .expect("write within the fragment");
        current += n;
        if writer.chunk_count() < before {
            fragments.push(current);
            current = 0;
        }
    }
    (wire, fragments)
}

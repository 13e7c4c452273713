//! Drivers connecting [`FrameReader`] and [`FrameWriter`] to tokio streams.
//!
//! The codec itself performs no I/O. These helpers read straight into the
//! reader's target buffer and write fragments straight out of the writer, so
//! no intermediate copies are made.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::{
    byte_order::LENGTH_PREFIX_SIZE,
    error::Result,
    frame::{ChunkListener, FrameReader, FrameWriter, FramingError},
};

/// End-of-stream conditions that interrupt a chunk.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The peer closed while the length prefix was being read.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Size of the length prefix.
        header_size: usize,
    },
    /// The peer closed while a chunk body was being read.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte chunk received")]
    MidChunk {
        /// Body bytes received before EOF.
        bytes_received: usize,
        /// Length announced by the prefix.
        expected: usize,
    },
}

/// Result of a single [`read_once`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// Bytes were consumed by the reader.
    Progress {
        /// Bytes read from the stream.
        bytes: usize,
        /// Chunks completed by those bytes.
        chunks: usize,
    },
    /// The stream reported end of file.
    Eof,
}

/// Perform one read from `io` directly into the reader's target buffer.
///
/// # Errors
///
/// Returns an I/O error from the stream or the [`FramingError`] raised by the
/// bytes read. A poisoned reader fails without touching the stream.
pub async fn read_once<R, L>(io: &mut R, reader: &mut FrameReader<L>) -> Result<ReadStatus>
where
    R: AsyncRead + Unpin,
    L: ChunkListener,
{
    let target = reader.target();
    if target.is_empty() {
        return Err(FramingError::Poisoned.into());
    }
    let bytes = io.read(target).await?;
    if bytes == 0 {
        return Ok(ReadStatus::Eof);
    }
    let chunks = reader.set_bytes_written(bytes)?;
    trace!(bytes, chunks, "read from stream");
    Ok(ReadStatus::Progress { bytes, chunks })
}

/// Classify end of stream for `reader`.
///
/// # Errors
///
/// Returns [`EofError`] unless the reader sits on a chunk boundary.
pub fn check_eof<L>(reader: &FrameReader<L>) -> std::result::Result<(), EofError> {
    if reader.is_idle() {
        return Ok(());
    }
    let bytes_received = reader.buffered();
    Err(match reader.pending_chunk_len() {
        None => EofError::MidHeader {
            bytes_received,
            header_size: LENGTH_PREFIX_SIZE,
        },
        Some(expected) => EofError::MidChunk {
            bytes_received,
            expected,
        },
    })
}

/// Read from `io` until end of stream, delivering chunks as they complete.
///
/// Returns the total number of chunks the reader has delivered.
///
/// # Errors
///
/// Returns the first I/O or framing error, or an [`EofError`] when the stream
/// ends part way through a chunk.
pub async fn read_to_end<R, L>(io: &mut R, reader: &mut FrameReader<L>) -> Result<u64>
where
    R: AsyncRead + Unpin,
    L: ChunkListener,
{
    loop {
        if read_once(io, reader).await? == ReadStatus::Eof {
            check_eof(reader)?;
            debug!(chunks = reader.chunks_read(), "stream closed at chunk boundary");
            return Ok(reader.chunks_read());
        }
    }
}

/// Write every completed fragment held by `writer` to `io`, then flush.
///
/// Returns the number of fragments written. Partial writes are tracked by the
/// writer, so a cancelled flush can be resumed.
///
/// # Errors
///
/// Returns an I/O error from the stream, including
/// [`io::ErrorKind::WriteZero`] if the stream stops accepting bytes.
pub async fn flush_fragments<W>(io: &mut W, writer: &mut FrameWriter) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut fragments = 0;
    while let Some(fragment) = writer.current_fragment() {
        let remaining = writer.chunk_count();
        let written = io.write(fragment).await?;
        if written == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero).into());
        }
        writer.set_bytes_written(written)?;
        if writer.chunk_count() < remaining {
            fragments += 1;
        }
    }
    io.flush().await?;
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tokio::io::{AsyncWriteExt, duplex};

    use super::*;
    use crate::{error::RelayError, frame::FrameConfig};

    #[derive(Default)]
    struct Chunks(Vec<Vec<u8>>);

    impl ChunkListener for Chunks {
        fn on_chunk_complete(&mut self, chunk: &[u8]) { self.0.push(chunk.to_vec()); }
    }

    fn collecting() -> FrameReader<Chunks> {
        FrameReader::new(FrameConfig::new(1024, 16), Chunks::default())
    }

    #[tokio::test]
    async fn read_to_end_delivers_chunks_and_accepts_clean_close() {
        let (mut client, mut server) = duplex(64);
        let mut writer = FrameWriter::new(FrameConfig::new(1024, 16));
        for body in [&b"hello"[..], &[7_u8; 40][..]] {
            writer.write(body).expect("within limit");
            writer.mark_chunk_completed().expect("non-empty");
        }
        let sender = tokio::spawn(async move {
            let fragments = flush_fragments(&mut client, &mut writer)
                .await
                .expect("flush");
            client.shutdown().await.expect("shutdown");
            fragments
        });

        let mut reader = collecting();
        let chunks = read_to_end(&mut server, &mut reader).await.expect("clean");
        assert_eq!(chunks, 2);
        assert_eq!(sender.await.expect("sender task"), 4);
        assert_eq!(
            reader.into_listener().0,
            vec![b"hello".to_vec(), vec![7_u8; 40]]
        );
    }

    #[rstest]
    #[case::mid_header(vec![0, 0], EofError::MidHeader { bytes_received: 2, header_size: 4 })]
    #[case::mid_chunk(vec![0, 0, 0, 9, 1, 2, 3], EofError::MidChunk { bytes_received: 3, expected: 9 })]
    #[tokio::test]
    async fn premature_close_is_classified(#[case] wire: Vec<u8>, #[case] expected: EofError) {
        let (mut client, mut server) = duplex(64);
        client.write_all(&wire).await.expect("write");
        drop(client);

        let mut reader = collecting();
        let err = read_to_end(&mut server, &mut reader)
            .await
            .expect_err("premature close");
        assert!(matches!(err, RelayError::Eof(eof) if eof == expected));
    }

    #[tokio::test]
    async fn framing_error_surfaces_and_poisons() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0, 0, 0, 0]).await.expect("write");

        let mut reader = collecting();
        let err = read_once(&mut server, &mut reader)
            .await
            .expect_err("empty chunk");
        assert!(matches!(err, RelayError::Framing(FramingError::EmptyChunk)));
        let err = read_once(&mut server, &mut reader)
            .await
            .expect_err("poisoned");
        assert!(matches!(err, RelayError::Framing(FramingError::Poisoned)));
    }
}

//! Line codec for the handshake.
//!
//! Lines are raw bytes: a payload is the maximal run of non-newline bytes
//! after any leading whitespace, so blank lines and indentation before a
//! payload never count as the line. Nothing is decoded as text and nothing
//! but the terminating newline is removed (a `\r` before it is kept).
//! Works over any AsyncRead/AsyncWrite (pipes, in-memory duplex streams).

use std::io;

use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Errors from [`LineCodec`].
#[derive(Debug, thiserror::Error)]
pub enum LineCodecError {
    #[error("line exceeds {0} bytes")]
    TooLong(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Codec that reads one bounded line at a time.
///
/// A payload longer than `max_length` bytes (newline excluded) yields
/// [`LineCodecError::TooLong`] instead of growing the buffer. Skipped
/// leading whitespace does not count against the bound.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Still discarding whitespace in front of the next payload.
    skipping: bool,
}

impl LineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            skipping: true,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Drop leading whitespace. Returns false if `src` ran out first.
    fn skip_blank(&mut self, src: &mut BytesMut) -> bool {
        if self.skipping {
            let blank = src
                .iter()
                .take_while(|b| b.is_ascii_whitespace() || **b == b'\x0b')
                .count();
            src.advance(blank);
            if src.is_empty() {
                return false;
            }
            self.skipping = false;
        }
        true
    }
}

impl Decoder for LineCodec {
    type Item = BytesMut;
    type Error = LineCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.skip_blank(src) {
            return Ok(None);
        }

        // Only look one byte past the bound: that is where the newline of the
        // longest acceptable line can be.
        let window = src.len().min(self.max_length + 1);
        match src[..window].iter().position(|b| *b == b'\n') {
            Some(end) => {
                let mut line = src.split_to(end + 1);
                line.truncate(end);
                self.skipping = true;
                Ok(Some(line))
            }
            None if src.len() > self.max_length => Err(LineCodecError::TooLong(self.max_length)),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        // An unterminated last line still counts once the writer is gone.
        if src.is_empty() {
            return Ok(None);
        }
        self.skipping = true;
        Ok(Some(src.split()))
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for LineCodec {
    type Error = LineCodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.as_ref();
        tracing::trace!(line_bytes = line.len(), "Encoding line");
        dst.reserve(line.len() + 1);
        dst.put_slice(line);
        dst.put_u8(b'\n');
        Ok(())
    }
}

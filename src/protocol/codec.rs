//! Telegram framing
//!
//! Splits a received datagram into the self-length-prefixed telegrams it
//! carries. A malformed length ends framing of that datagram; there is no
//! attempt to resynchronize on the remaining bytes.

use thiserror::Error;

use super::MIN_TELEGRAM_LEN;

/// Framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Invalid telegram length {length} at offset {offset}")]
    InvalidLength { offset: usize, length: usize },

    #[error("Telegram at offset {offset} declares {length} bytes but only {available} remain")]
    Overrun {
        offset: usize,
        length: usize,
        available: usize,
    },
}

/// Lazy iterator over the telegrams of one datagram
///
/// Yields each telegram in order. After a framing error is yielded the
/// iterator is exhausted.
#[derive(Debug, Clone)]
pub struct Telegrams<'a> {
    buf: &'a [u8],
    offset: usize,
}

/// Frame a received buffer into telegrams
pub fn frame(buf: &[u8]) -> Telegrams<'_> {
    Telegrams { buf, offset: 0 }
}

impl<'a> Telegrams<'a> {
    /// Bytes not yet framed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }
}

impl<'a> Iterator for Telegrams<'a> {
    type Item = Result<&'a [u8], FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buf.len() {
            return None;
        }

        let offset = self.offset;
        let length = self.buf[offset] as usize;
        let available = self.buf.len() - offset;

        // On error the rest of the buffer is dropped.
        if length < MIN_TELEGRAM_LEN {
            self.offset = self.buf.len();
            return Some(Err(FramingError::InvalidLength { offset, length }));
        }
        if length > available {
            self.offset = self.buf.len();
            return Some(Err(FramingError::Overrun {
                offset,
                length,
                available,
            }));
        }

        self.offset += length;
        Some(Ok(&self.buf[offset..offset + length]))
    }
}

impl<'a> std::iter::FusedIterator for Telegrams<'a> {}

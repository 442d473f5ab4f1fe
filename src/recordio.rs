//! RecordIO framing for the subscription stream.
//!
//! The master frames each event as an ASCII record length, a newline, and
//! that many bytes of payload:
//!
//! ```text
//! 121\n{"type": "HEARTBEAT"}...
//! ```
//!
//! Chunk boundaries from the transport fall anywhere, so the reader
//! accumulates until a full record is buffered.

use bytes::{Buf, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::error::SchedulerError;

/// Upper bound on a single record; anything larger is a framing error.
const MAX_RECORD_LEN: usize = 4 * 1024 * 1024;

/// Reads length-prefixed records off a chunked byte stream.
pub struct RecordIoReader<S> {
    stream: S,
    buf: BytesMut,
    done: bool,
}

impl<S, E> RecordIoReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
            done: false,
        }
    }

    /// Next complete record, `None` on clean end of stream.
    pub async fn next_record(&mut self) -> Result<Option<Bytes>, SchedulerError> {
        loop {
            if let Some(record) = self.extract()? {
                return Ok(Some(record));
            }

            if self.done {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(SchedulerError::Framing(
                    "stream ended mid-record".to_string(),
                ));
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(SchedulerError::Framing(e.to_string())),
                None => self.done = true,
            }
        }
    }

    /// Pop one record from the buffer if a full one is present.
    fn extract(&mut self) -> Result<Option<Bytes>, SchedulerError> {
        let Some(newline) = self.buf.iter().position(|&b| b == b'\n') else {
            if self.buf.len() > 32 {
                return Err(SchedulerError::Framing(
                    "length prefix too long".to_string(),
                ));
            }
            return Ok(None);
        };

        let prefix = std::str::from_utf8(&self.buf[..newline])
            .map_err(|_| SchedulerError::Framing("non-ascii length prefix".to_string()))?;
        let len: usize = prefix
            .parse()
            .map_err(|_| SchedulerError::Framing(format!("bad length prefix {prefix:?}")))?;

        if len > MAX_RECORD_LEN {
            return Err(SchedulerError::Framing(format!(
                "record of {len} bytes exceeds cap"
            )));
        }

        if self.buf.len() < newline + 1 + len {
            return Ok(None);
        }

        self.buf.advance(newline + 1);
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures_util::stream;

    use super::*;

    fn reader(
        chunks: Vec<&'static [u8]>,
    ) -> RecordIoReader<impl Stream<Item = Result<Bytes, Infallible>> + Unpin> {
        RecordIoReader::new(stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[tokio::test]
    async fn test_single_record() {
        let mut r = reader(vec![b"5\nhello"]);
        assert_eq!(r.next_record().await.unwrap().unwrap(), "hello");
        assert!(r.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_split_across_chunks() {
        let mut r = reader(vec![b"1", b"1\nhello", b" world"]);
        assert_eq!(r.next_record().await.unwrap().unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_multiple_records_in_one_chunk() {
        let mut r = reader(vec![b"3\nfoo4\nbars"]);
        assert_eq!(r.next_record().await.unwrap().unwrap(), "foo");
        assert_eq!(r.next_record().await.unwrap().unwrap(), "bars");
        assert!(r.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_prefix_is_framing_error() {
        let mut r = reader(vec![b"xyz\nabc"]);
        assert!(matches!(
            r.next_record().await,
            Err(SchedulerError::Framing(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_record_is_error() {
        let mut r = reader(vec![b"10\nshort"]);
        assert!(matches!(
            r.next_record().await,
            Err(SchedulerError::Framing(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_record() {
        let mut r = reader(vec![b"0\n3\nabc"]);
        assert_eq!(r.next_record().await.unwrap().unwrap(), "");
        assert_eq!(r.next_record().await.unwrap().unwrap(), "abc");
    }
}

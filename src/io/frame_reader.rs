//! Buffered exact-length reads over a byte stream
//!
//! The camera server writes packets back to back, so a single socket read may
//! return the tail of one packet together with the head of the next. The
//! [`FrameReader`] owns the bytes read past the requested length and hands
//! them out first on the following call.

use crate::error::{Result, SiError};
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Maximum bytes requested from the stream per read
pub const CHUNK_SIZE: usize = 8192;

/// Default bound on a single read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Exact-length reader with an owned residual buffer
///
/// # Examples
///
/// ```
/// use si_camera_rust::io::FrameReader;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> si_camera_rust::Result<()> {
/// let stream: &[u8] = &[1, 2, 3, 4, 5];
/// let mut reader = FrameReader::new(stream);
/// assert_eq!(&reader.receive(2).await?[..], &[1, 2]);
/// assert_eq!(&reader.receive(3).await?[..], &[3, 4, 5]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    residual: BytesMut,
    read_timeout: Duration,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a stream with the default read timeout
    pub fn new(inner: R) -> Self {
        Self::with_read_timeout(inner, DEFAULT_READ_TIMEOUT)
    }

    /// Wrap a stream with a custom per-read timeout
    pub fn with_read_timeout(inner: R, read_timeout: Duration) -> Self {
        FrameReader {
            inner,
            residual: BytesMut::with_capacity(CHUNK_SIZE),
            read_timeout,
        }
    }

    /// Bytes read from the stream but not yet handed out
    pub fn buffered(&self) -> usize {
        self.residual.len()
    }

    /// Mutable access to the wrapped stream, used for writes
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Return exactly `n` bytes
    ///
    /// Buffered bytes are consumed first. Each stream read is bounded by the
    /// read timeout; a stall fails with an I/O `TimedOut` error and EOF before
    /// `n` bytes fails with [`SiError::ConnectionClosed`].
    pub async fn receive(&mut self, n: usize) -> Result<Bytes> {
        let limit = self.read_timeout;
        while self.residual.len() < n {
            let read = self.fill(Some(limit)).await?;
            if read == 0 {
                return Err(SiError::ConnectionClosed {
                    expected: n,
                    received: self.residual.len(),
                });
            }
        }

        trace!(
            requested = n,
            leftover = self.residual.len() - n,
            "Frame bytes received"
        );
        Ok(self.residual.split_to(n).freeze())
    }

    /// Wait until at least one byte is available
    ///
    /// Not bounded by the read timeout: the camera may take arbitrarily long
    /// to answer a command that starts a long device operation.
    pub async fn wait_readable(&mut self) -> Result<()> {
        if !self.residual.is_empty() {
            return Ok(());
        }
        let read = self.fill(None).await?;
        if read == 0 {
            return Err(SiError::ConnectionClosed {
                expected: 1,
                received: 0,
            });
        }
        Ok(())
    }

    async fn fill(&mut self, limit: Option<Duration>) -> Result<usize> {
        let mut chunk = [0u8; CHUNK_SIZE];
        let read = match limit {
            Some(limit) => tokio::time::timeout(limit, self.inner.read(&mut chunk))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no data from camera within {:?}", limit),
                    )
                })??,
            None => self.inner.read(&mut chunk).await?,
        };
        self.residual.extend_from_slice(&chunk[..read]);
        trace!(read, buffered = self.residual.len(), "Stream read");
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_single_byte_chunks() {
        let mock = Builder::new()
            .read(&[1])
            .read(&[2])
            .read(&[3])
            .read(&[4])
            .build();
        let mut reader = FrameReader::new(mock);
        let bytes = reader.receive(4).await.unwrap();
        assert_eq!(&bytes[..], &[1, 2, 3, 4]);
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_over_read_is_kept_for_next_call() {
        let mock = Builder::new().read(&[1, 2, 3, 4, 5, 6, 7]).build();
        let mut reader = FrameReader::new(mock);

        assert_eq!(&reader.receive(3).await.unwrap()[..], &[1, 2, 3]);
        assert_eq!(reader.buffered(), 4);
        assert_eq!(&reader.receive(4).await.unwrap()[..], &[4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_residual_consumed_before_stream() {
        let mock = Builder::new().read(&[1, 2, 3]).read(&[4, 5]).build();
        let mut reader = FrameReader::new(mock);

        assert_eq!(&reader.receive(2).await.unwrap()[..], &[1, 2]);
        assert_eq!(&reader.receive(3).await.unwrap()[..], &[3, 4, 5]);
    }

    #[tokio::test]
    async fn test_eof_mid_frame() {
        let mock = Builder::new().read(&[1, 2]).build();
        let mut reader = FrameReader::new(mock);

        let result = reader.receive(6).await;
        assert!(matches!(
            result,
            Err(SiError::ConnectionClosed {
                expected: 6,
                received: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_wait_readable_keeps_bytes() {
        let mock = Builder::new().read(&[9, 8]).build();
        let mut reader = FrameReader::new(mock);

        reader.wait_readable().await.unwrap();
        assert_eq!(reader.buffered(), 2);
        assert_eq!(&reader.receive(2).await.unwrap()[..], &[9, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_read_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let mut reader = FrameReader::with_read_timeout(client, Duration::from_secs(1));

        match reader.receive(1).await {
            Err(SiError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}

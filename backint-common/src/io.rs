// Copyright (C) 2024 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// An [`AsyncRead`] wrapper that counts the bytes it hands out.
///
/// The upload path wraps the source FIFO in a `CountingReader` so the number
/// of bytes pulled by the uploader can be reported once the transfer is done.
pub struct CountingReader<R> {
    inner: R,
    num_bytes: Arc<AtomicU64>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> CountingReader<R> {
        CountingReader {
            inner,
            num_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle on the byte counter, usable after the reader is consumed.
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.num_bytes.clone()
    }

    pub fn num_bytes(&self) -> u64 {
        self.num_bytes.load(Ordering::Relaxed)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let num_filled_before = buf.filled().len();
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let num_read = buf.filled().len() - num_filled_before;
                this.num_bytes.fetch_add(num_read as u64, Ordering::Relaxed);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::CountingReader;

    #[tokio::test]
    async fn test_counting_reader_counts_bytes() {
        let payload = b"abcdefghijklmnopqrstuvwxyz".to_vec();
        let mut reader = CountingReader::new(std::io::Cursor::new(payload.clone()));
        let counter = reader.counter();

        let mut read_payload = Vec::new();
        reader.read_to_end(&mut read_payload).await.unwrap();

        assert_eq!(read_payload, payload);
        assert_eq!(reader.num_bytes(), payload.len() as u64);
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 26);
    }

    #[tokio::test]
    async fn test_counting_reader_empty_source() {
        let mut reader = CountingReader::new(std::io::Cursor::new(Vec::new()));
        let mut read_payload = Vec::new();
        reader.read_to_end(&mut read_payload).await.unwrap();
        assert_eq!(reader.num_bytes(), 0);
    }
}

// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::Error;
use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The default chunk size used by [`ByteStream::new`] when none is given.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// A lazy sequence of byte chunks read from any [`std::io::Read`] (§6).
///
/// Each call to [`ByteStream::next_chunk`] performs at most one blocking
/// read, so — consistent with the concurrency model — a stream backed by a
/// slow source stalls the whole scheduler for the duration of that read.
/// Prefer [`crate::socket::Socket`] for anything that can be made
/// non-blocking.
pub struct ByteStream<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: Read> ByteStream<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    #[must_use]
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        ByteStream {
            reader,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Read the next chunk. An empty `Vec` signals end-of-stream; the stream
    /// may be polled again afterward and will keep returning empty chunks.
    #[must_use = "futures do nothing unless polled by a Scheduler"]
    pub fn next_chunk(&mut self) -> NextChunk<'_, R> {
        NextChunk { stream: self }
    }
}

#[must_use = "futures do nothing unless polled by a Scheduler"]
pub struct NextChunk<'a, R> {
    stream: &'a mut ByteStream<R>,
}

impl<R: Read + Unpin> Future for NextChunk<'_, R> {
    type Output = Result<Vec<u8>, Error>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut buf = vec![0u8; this.stream.chunk_size];
        match this.stream.reader.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Poll::Ready(Ok(buf))
            }
            Err(err) => Poll::Ready(Err(Error::runtime(format!("byte stream read failed: {err}")))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use std::io::Cursor;

    #[test]
    fn reads_chunks_until_empty() {
        let scheduler = Scheduler::new();
        let data = b"hello world".to_vec();
        let mut stream = ByteStream::with_chunk_size(Cursor::new(data), 4);

        let handle = scheduler.spawn(async move {
            let mut collected = Vec::new();
            loop {
                let chunk = stream.next_chunk().await?;
                if chunk.is_empty() {
                    break;
                }
                collected.extend_from_slice(&chunk);
            }
            Ok::<_, Error>(collected)
        });
        scheduler.run();
        assert_eq!(handle.unwrap(), b"hello world".to_vec());
    }

    #[test]
    fn empty_reader_yields_an_empty_chunk_immediately() {
        let scheduler = Scheduler::new();
        let mut stream = ByteStream::new(Cursor::new(Vec::<u8>::new()));
        let handle = scheduler.spawn(async move { stream.next_chunk().await });
        scheduler.run();
        assert!(handle.unwrap().is_empty());
    }
}

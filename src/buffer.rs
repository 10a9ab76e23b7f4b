//! Growable byte buffer with head-offset compaction.
//!
//! Generalizes the read/write pattern `HttpConnection` used to inline
//! directly on a `Vec<u8>` (`read_data`/`write_data` in the teacher's
//! `http_connection.rs`) into a standalone type shared by the inbound byte
//! stream and the outbound response queue of every connection.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};

/// A byte queue that drains from the head and appends at the tail.
///
/// Draining doesn't shift the remaining bytes on every call; `head` tracks
/// how far into `data` has already been consumed, and the buffer only
/// compacts (moves the live bytes back to index 0) once the drained prefix
/// grows past half the buffer's length. Single-owner, no internal locking.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    head: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new(), head: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn append_fmt(&mut self, args: std::fmt::Arguments<'_>) {
        let mut s = String::new();
        let _ = s.write_fmt(args);
        self.append(s.as_bytes());
    }

    /// Bytes currently live in the buffer, head to tail.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Copies up to `dst.len()` bytes from the head into `dst`, consuming
    /// them. Returns the number of bytes copied (`min(dst.len(), self.len())`).
    pub fn drain_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len());
        dst[..n].copy_from_slice(&self.data[self.head..self.head + n]);
        self.head += n;
        self.compact_if_needed();
        n
    }

    /// Drops up to `n` bytes from the head without copying them anywhere.
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.len());
        self.head += n;
        self.compact_if_needed();
    }

    /// Peeks at up to the first `n` live bytes without draining.
    pub fn peek(&self, n: usize) -> &[u8] {
        let n = n.min(self.len());
        &self.data[self.head..self.head + n]
    }

    /// Splices the first `len` bytes of `file` (starting at `offset`) into
    /// the buffer, logically equivalent to a read-then-append.
    pub fn splice_from_file(&mut self, file: &mut File, offset: u64, len: usize) -> io::Result<usize> {
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(offset))?;
        let mut chunk = vec![0u8; len];
        let mut total = 0;
        while total < len {
            match file.read(&mut chunk[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        chunk.truncate(total);
        self.append(&chunk);
        Ok(total)
    }

    /// Flushes as much of the live buffer as possible to `dst`. Returns the
    /// number of bytes written, or `Ok(0)` on a transient would-block.
    pub fn flush_to(&mut self, dst: &mut impl Write) -> io::Result<usize> {
        match dst.write(self.as_slice()) {
            Ok(n) => {
                self.discard(n);
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn compact_if_needed(&mut self) {
        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        } else if self.head > 0 && self.head * 2 >= self.data.len() {
            self.data.drain(..self.head);
            self.head = 0;
        }
    }
}

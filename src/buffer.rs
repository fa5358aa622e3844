// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Growable byte buffer with separate read/write cursors.
//!
//! The readable region is `[r, w)`, the writable region is `[w, cap)`, and the
//! prependable region is `[0, r)`. Bytes consumed via `retrieve*` are never
//! physically removed until a later `append` needs the space back.

use std::io::{IoSliceMut, Read, Write};

/// Default initial capacity used by [`Connection`](crate::connection::Connection)
/// buffers; callers needing a different starting size pass it to [`Buffer::new`]
/// directly.
pub const DEFAULT_CAPACITY: usize = 1024;
const EXTRA_BUF_SIZE: usize = 65535;

/// A growable, contiguous byte buffer with read/write cursors.
#[derive(Debug)]
pub struct Buffer {
    buf: Vec<u8>,
    read_offset: usize,
    write_offset: usize,
}

impl Buffer {
    /// Creates a buffer with the given initial capacity (rounded up by `Vec`'s own
    /// growth policy; zero is legal and grows lazily on first `append`).
    pub fn new(initial_capacity: usize) -> Self {
        Buffer {
            buf: vec![0u8; initial_capacity],
            read_offset: 0,
            write_offset: 0,
        }
    }

    /// Number of bytes available to read.
    pub fn readable_bytes(&self) -> usize {
        self.write_offset - self.read_offset
    }

    /// Number of bytes that can be written without growing.
    pub fn writable_bytes(&self) -> usize {
        self.buf.len() - self.write_offset
    }

    /// Number of bytes available at the front of the buffer for prepending.
    pub fn prependable_bytes(&self) -> usize {
        self.read_offset
    }

    /// A slice over the readable region, stable until the next mutation.
    pub fn peek(&self) -> &[u8] {
        &self.buf[self.read_offset..self.write_offset]
    }

    /// Advances the read cursor by `n`. Panics if `n > readable_bytes()`, matching
    /// the source's assertion-based contract.
    pub fn retrieve(&mut self, n: usize) {
        assert!(n <= self.readable_bytes());
        if n < self.readable_bytes() {
            self.read_offset += n;
        } else {
            self.retrieve_all();
        }
    }

    /// Advances the read cursor up to (but not past) the position identified by
    /// `end`, a sub-slice pointer previously obtained from [`Buffer::peek`] (or any
    /// pointer within the current readable region, such as the position just past a
    /// located CRLF). `end` is expressed as an offset from `peek()`'s start.
    pub fn retrieve_until(&mut self, offset_from_peek: usize) {
        assert!(offset_from_peek <= self.readable_bytes());
        self.retrieve(offset_from_peek);
    }

    /// Resets both cursors to zero and zeroes the readable region defensively.
    pub fn retrieve_all(&mut self) {
        for b in &mut self.buf[self.read_offset..self.write_offset] {
            *b = 0;
        }
        self.read_offset = 0;
        self.write_offset = 0;
    }

    /// Returns the readable region as a fresh owned `String` (lossily, as the wire
    /// format is not guaranteed valid UTF-8 byte-for-byte) and retrieves everything.
    pub fn retrieve_all_to_string(&mut self) -> String {
        let s = String::from_utf8_lossy(self.peek()).into_owned();
        self.retrieve_all();
        s
    }

    /// Appends `data` to the writable region, growing as needed.
    pub fn append(&mut self, data: &[u8]) {
        self.ensure_writable(data.len());
        let start = self.write_offset;
        self.buf[start..start + data.len()].copy_from_slice(data);
        self.write_offset += data.len();
    }

    /// Ensures at least `n` bytes of writable space, growing or compacting as
    /// needed.
    pub fn ensure_writable(&mut self, n: usize) {
        if self.writable_bytes() < n {
            self.make_space(n);
        }
    }

    /// Grows or compacts the buffer so that at least `n` bytes are writable.
    fn make_space(&mut self, n: usize) {
        if self.writable_bytes() + self.prependable_bytes() < n {
            self.buf.resize(self.write_offset + n + 1, 0);
        } else {
            let readable = self.readable_bytes();
            self.buf.copy_within(self.read_offset..self.write_offset, 0);
            self.read_offset = 0;
            self.write_offset = readable;
        }
    }

    /// Performs a scatter read from `src`: the writable region followed by a
    /// 65535-byte on-stack overflow buffer, mirroring the two-iovec `readv` used by
    /// the source. Returns the number of bytes read (0 signals EOF).
    ///
    /// Loops are the caller's responsibility; under edge-triggered readiness the
    /// caller must keep calling this until it returns `IoAgain`.
    pub fn read_fd<R: Read>(&mut self, src: &mut R) -> crate::error::Result<usize> {
        self.ensure_writable(EXTRA_BUF_SIZE);
        let writable = self.writable_bytes();
        let mut extra = [0u8; EXTRA_BUF_SIZE];

        let n = {
            let mut slices = [
                IoSliceMut::new(&mut self.buf[self.write_offset..]),
                IoSliceMut::new(&mut extra),
            ];
            src.read_vectored(&mut slices)
                .map_err(crate::error::RaskError::from_io)?
        };

        if n <= writable {
            self.write_offset += n;
        } else {
            self.write_offset = self.buf.len();
            self.append(&extra[..n - writable]);
        }

        Ok(n)
    }

    /// Writes `readable_bytes()` bytes to `dst` starting at `peek()`, advancing the
    /// read cursor by the number actually written.
    pub fn write_fd<W: Write>(&mut self, dst: &mut W) -> crate::error::Result<usize> {
        let n = dst
            .write(self.peek())
            .map_err(crate::error::RaskError::from_io)?;
        self.retrieve(n);
        Ok(n)
    }

    /// Total allocated capacity. Exposed for the buffer invariant property test.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty() {
        let b = Buffer::new(8);
        assert_eq!(0, b.readable_bytes());
        assert_eq!(0, b.prependable_bytes());
    }

    #[test]
    fn append_then_peek_round_trips() {
        let mut b = Buffer::new(8);
        b.append(b"hello");
        assert_eq!(b"hello", b.peek());
    }

    #[test]
    fn retrieve_all_to_string_round_trips() {
        let mut b = Buffer::new(8);
        b.append(b"hello world");
        assert_eq!("hello world", b.retrieve_all_to_string());
        assert_eq!(0, b.readable_bytes());
    }

    #[test]
    fn invariant_readable_plus_prependable_plus_writable_equals_capacity() {
        let mut b = Buffer::new(8);
        b.append(b"12345");
        b.retrieve(3);
        let cap = b.capacity();
        assert_eq!(
            cap,
            b.readable_bytes() + b.prependable_bytes() + b.writable_bytes()
        );
    }

    #[test]
    fn growth_compacts_readable_region_to_front() {
        // S6: start cap=8, append 5, retrieve 5, append 10.
        let mut b = Buffer::new(8);
        b.append(b"abcde");
        b.retrieve(5);
        b.append(b"0123456789");
        assert_eq!(b"0123456789", b.peek());
        assert!(b.capacity() >= 11);
    }

    #[test]
    fn retrieve_partial_advances_read_cursor_only() {
        let mut b = Buffer::new(8);
        b.append(b"abcdef");
        b.retrieve(2);
        assert_eq!(b"cdef", b.peek());
        assert_eq!(2, b.prependable_bytes());
    }

    #[test]
    fn read_fd_appends_from_reader() {
        let mut b = Buffer::new(8);
        let mut src: &[u8] = b"abcdefgh";
        let n = b.read_fd(&mut src).unwrap();
        assert_eq!(8, n);
        assert_eq!(b"abcdefgh", b.peek());
    }

    #[test]
    fn write_fd_drains_readable_region() {
        let mut b = Buffer::new(8);
        b.append(b"abcdef");
        let mut dst: Vec<u8> = Vec::new();
        let n = b.write_fd(&mut dst).unwrap();
        assert_eq!(6, n);
        assert_eq!(b"abcdef", dst.as_slice());
        assert_eq!(0, b.readable_bytes());
    }
}

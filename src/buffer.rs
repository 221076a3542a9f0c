//! Growable byte buffer with independent read/write cursors.
//!
//! Every connection owns two of these (inbound and outbound); the response
//! builder stages header bytes through one as well. The layout is a single
//! contiguous allocation split by two cursors:
//!
//! ```text
//! |----------------- data ------------------|
//!            read_pos      write_pos
//!               v              v
//! |--prependable--|--readable--|--writable--|
//! ```
//!
//! `append` copies into the writable tail, `retrieve` consumes from the
//! readable region. When the tail runs out, `ensure_writable` either
//! compacts (sliding the readable region to offset 0) or grows the
//! allocation in place; capacity never shrinks.

use std::io::{self, IoSliceMut};
use std::os::fd::AsFd;

use nix::sys::uio;
use nix::unistd;

const INITIAL_SIZE: usize = 1024;

/// Size of the transient on-stack spill area used by `read_fd`. An inbound
/// burst larger than the writable tail is drained in the same syscall and
/// appended afterwards.
const SPILL_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Current capacity of the underlying allocation.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes available to read: `write_pos - read_pos`.
    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Bytes available to write at the tail.
    pub fn writable_bytes(&self) -> usize {
        self.data.len() - self.write_pos
    }

    /// Bytes already consumed at the front, reclaimable by compaction.
    pub fn prependable_bytes(&self) -> usize {
        self.read_pos
    }

    /// The current readable region.
    pub fn peek(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    /// Consume `len` readable bytes.
    pub fn retrieve(&mut self, len: usize) {
        assert!(len <= self.readable_bytes(), "retrieve past write cursor");
        self.read_pos += len;
    }

    /// Consume everything and reset both cursors to 0.
    pub fn retrieve_all(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Drain the readable region into an owned string (lossy on invalid
    /// UTF-8) and reset the buffer.
    pub fn retrieve_all_to_string(&mut self) -> String {
        let s = String::from_utf8_lossy(self.peek()).into_owned();
        self.retrieve_all();
        s
    }

    /// Guarantee at least `len` writable bytes, compacting or growing.
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable_bytes() < len {
            self.make_space(len);
        }
        assert!(self.writable_bytes() >= len);
    }

    /// Advance the write cursor after writing directly into the tail.
    pub fn has_written(&mut self, len: usize) {
        assert!(len <= self.writable_bytes(), "write past capacity");
        self.write_pos += len;
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure_writable(bytes.len());
        self.data[self.write_pos..self.write_pos + bytes.len()].copy_from_slice(bytes);
        self.has_written(bytes.len());
    }

    pub fn append_str(&mut self, s: &str) {
        self.append(s.as_bytes());
    }

    /// Scatter-read from `fd` into the writable tail plus a fixed spill
    /// area, so one syscall drains more than the current capacity. Overflow
    /// that landed in the spill is appended (growing the buffer).
    pub fn read_fd<Fd: AsFd>(&mut self, fd: &Fd) -> io::Result<usize> {
        let mut spill = [0u8; SPILL_SIZE];
        let writable = self.writable_bytes();
        let n = {
            let (_, tail) = self.data.split_at_mut(self.write_pos);
            let mut iov = [IoSliceMut::new(tail), IoSliceMut::new(&mut spill)];
            uio::readv(fd, &mut iov).map_err(io::Error::from)?
        };
        if n <= writable {
            self.write_pos += n;
        } else {
            self.write_pos = self.data.len();
            self.append(&spill[..n - writable]);
        }
        Ok(n)
    }

    /// Write the readable region to `fd` once, advancing the read cursor by
    /// whatever the kernel accepted. A partial write leaves the remainder
    /// for the next call.
    pub fn write_fd<Fd: AsFd>(&mut self, fd: &Fd) -> io::Result<usize> {
        let n = unistd::write(fd, self.peek()).map_err(io::Error::from)?;
        self.retrieve(n);
        Ok(n)
    }

    fn make_space(&mut self, len: usize) {
        if self.writable_bytes() + self.prependable_bytes() < len {
            // Tail extension: readable bytes stay put.
            self.data.resize(self.write_pos + len + 1, 0);
        } else {
            // Compact: slide the readable region to the front.
            let readable = self.readable_bytes();
            self.data.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        }
    }
}

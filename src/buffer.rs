//! Elastic byte buffer shared by the codec and the connection I/O paths.
//!
//! The buffer is a contiguous region with two cursors, `read_pos <= write_pos
//! <= capacity`. Unread data lives in `[read_pos, write_pos)` and free space
//! in `[write_pos, capacity)`. When the unread region is fully drained both
//! cursors snap back to zero, so a request/reply workload keeps reusing the
//! front of the allocation. When free space runs out the buffer first tries
//! to compact (shift the unread bytes to offset zero) and only then grows.
//!
//! A buffer is owned by a single task at a time; there is no interior
//! synchronization.

use std::mem::size_of;

use byteorder::{ByteOrder, LittleEndian};

/// Byte order of all envelope header integers.
///
/// The wire format is fixed little-endian so that peers built for different
/// architectures interoperate.
pub type WireEndian = LittleEndian;

/// Starting capacity of a fresh buffer.
const INITIAL_CAPACITY: usize = 1024;

/// A grow-on-demand contiguous byte queue with read and write cursors.
#[derive(Debug, Clone)]
pub struct Buffer {
    storage: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::with_capacity(INITIAL_CAPACITY)
    }
}

impl Buffer {
    pub fn new() -> Self {
        Buffer::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Buffer {
            storage: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Number of unread bytes.
    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Number of bytes that can be appended without compacting or growing.
    pub fn writable_bytes(&self) -> usize {
        self.storage.len() - self.write_pos
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// The unread region.
    pub fn readable(&self) -> &[u8] {
        &self.storage[self.read_pos..self.write_pos]
    }

    /// The free tail region, for direct socket reads. Pair with
    /// [`advance_write`](Buffer::advance_write) once bytes have landed.
    pub fn writable_mut(&mut self) -> &mut [u8] {
        let write_pos = self.write_pos;
        &mut self.storage[write_pos..]
    }

    /// Records `n` bytes appended externally through `writable_mut`.
    pub fn advance_write(&mut self, n: usize) {
        assert!(n <= self.writable_bytes());
        self.write_pos += n;
    }

    /// Advances the read cursor by `n`. Draining the buffer completely resets
    /// both cursors to zero.
    pub fn retrieve(&mut self, n: usize) {
        assert!(n <= self.readable_bytes());
        if n < self.readable_bytes() {
            self.read_pos += n;
        } else {
            self.retrieve_all();
        }
    }

    pub fn retrieve_all(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Returns a view of the next `n` unread bytes and consumes them.
    pub fn read(&mut self, n: usize) -> &[u8] {
        assert!(n <= self.readable_bytes());
        let start = self.read_pos;
        self.retrieve(n);
        &self.storage[start..start + n]
    }

    /// Reads the next wire integer without consuming it.
    pub fn peek_u64(&self) -> u64 {
        assert!(self.readable_bytes() >= size_of::<u64>());
        WireEndian::read_u64(self.readable())
    }

    /// Consumes and returns the next wire integer.
    pub fn read_u64(&mut self) -> u64 {
        let value = self.peek_u64();
        self.retrieve(size_of::<u64>());
        value
    }

    /// Appends `data`, compacting or growing as needed.
    pub fn write(&mut self, data: &[u8]) {
        self.ensure_writable(data.len());
        let write_pos = self.write_pos;
        self.storage[write_pos..write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
    }

    /// Appends a wire integer.
    pub fn write_u64(&mut self, value: u64) {
        self.ensure_writable(size_of::<u64>());
        let write_pos = self.write_pos;
        WireEndian::write_u64(&mut self.storage[write_pos..], value);
        self.write_pos += size_of::<u64>();
    }

    /// Makes room for `len` more bytes. Prefers shifting the unread region to
    /// the front of the allocation; grows only when that is not enough.
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable_bytes() >= len {
            return;
        }
        if self.writable_bytes() + self.read_pos >= len {
            let readable = self.readable_bytes();
            self.storage.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        } else {
            self.storage.resize(self.write_pos + len, 0);
        }
    }

    /// Reallocates to exactly `readable_bytes() + reserve`, preserving the
    /// unread region.
    pub fn shrink(&mut self, reserve: usize) {
        let mut other = Buffer::with_capacity(self.readable_bytes() + reserve);
        other.write(self.readable());
        *self = other;
    }
}

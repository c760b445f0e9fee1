//! Envelope framing over a byte stream.
//!
//! Every RPC message, request or reply, travels as one envelope:
//!
//! ```text
//! +---------------------+-------------------+-----------------+
//! | total_length : u64  | method_id : u64   | payload : bytes |
//! +---------------------+-------------------+-----------------+
//! ```
//!
//! Integers are little-endian. `total_length` covers the method id and the
//! payload but not itself, so a whole envelope occupies `8 + total_length`
//! bytes on the wire.
//!
//! Decoding is a three-valued parse: a header is `Incomplete` until the whole
//! envelope is buffered, `Bad` when the advertised length cannot even hold a
//! method id, and `Ok` otherwise. Nothing is consumed until the parse commits
//! with `Ok`, so short reads can simply append more bytes and retry.

use std::io;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};

use tracing::trace;

use crate::buffer::Buffer;
use crate::service::Message;

/// Size in bytes of each fixed envelope field (`total_length`, `method_id`).
pub const WORD_SIZE: usize = size_of::<u64>();

/// Outcome of a header parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderParse {
    /// Not enough buffered bytes to hold the whole envelope; read more and
    /// retry. The read cursor has not moved.
    Incomplete,
    /// The advertised total length cannot contain a method id.
    Bad,
    /// The header was consumed; the rest of the envelope spans this many
    /// bytes and is fully buffered.
    Ok(u64),
}

/// Outcome of a whole-envelope parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parse {
    Incomplete,
    Bad,
    /// The envelope parsed; carries its method id.
    Ok(u64),
}

/// A [`Buffer`] that understands the envelope layout.
#[derive(Debug, Clone, Default)]
pub struct RpcBuffer {
    buffer: Buffer,
}

impl Deref for RpcBuffer {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}

impl DerefMut for RpcBuffer {
    fn deref_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }
}

impl RpcBuffer {
    pub fn new() -> Self {
        RpcBuffer::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        RpcBuffer { buffer: Buffer::with_capacity(capacity) }
    }

    /// The advertised total length of the envelope at the front of the
    /// buffer, if at least the length field is buffered.
    pub fn peek_total_length(&self) -> Option<u64> {
        if self.readable_bytes() < WORD_SIZE {
            return None;
        }
        Some(self.peek_u64())
    }

    /// Attempts to parse the envelope header at the front of the buffer.
    ///
    /// The length field is consumed only on [`HeaderParse::Ok`]; an
    /// incomplete envelope leaves the buffer untouched so the caller can
    /// append more bytes and try again.
    pub fn try_parse_header(&mut self) -> HeaderParse {
        let Some(total_length) = self.peek_total_length() else {
            return HeaderParse::Incomplete;
        };
        if total_length < WORD_SIZE as u64 {
            return HeaderParse::Bad;
        }
        if ((self.readable_bytes() - WORD_SIZE) as u64) < total_length {
            return HeaderParse::Incomplete;
        }
        self.retrieve(WORD_SIZE);
        HeaderParse::Ok(total_length)
    }

    /// Consumes the method id field. Only valid directly after
    /// [`HeaderParse::Ok`].
    pub fn parse_method_id(&mut self) -> u64 {
        self.read_u64()
    }

    /// Populates `dst` from the next `payload_len` buffered bytes.
    pub fn parse_message(&mut self, dst: &mut dyn Message, payload_len: usize) -> io::Result<()> {
        dst.merge(self.buffer.read(payload_len))
    }

    /// Parses one whole envelope into `dst`.
    ///
    /// A serializer rejection counts as [`Parse::Bad`]; by then the envelope
    /// bytes have been consumed and the connection is expected to close.
    pub fn parse<M: Message>(&mut self, dst: &mut M) -> Parse {
        let total_length = match self.try_parse_header() {
            HeaderParse::Incomplete => return Parse::Incomplete,
            HeaderParse::Bad => return Parse::Bad,
            HeaderParse::Ok(total_length) => total_length,
        };
        let method_id = self.parse_method_id();
        let payload_len = total_length as usize - WORD_SIZE;
        match self.parse_message(dst, payload_len) {
            Ok(()) => {
                trace!("parsed envelope, method id {:#018x}, {} payload byte(s)", method_id, payload_len);
                Parse::Ok(method_id)
            }
            Err(e) => {
                trace!("payload parse failed: {:?}", e);
                Parse::Bad
            }
        }
    }

    /// Appends one envelope carrying `message` addressed to `method_id`.
    pub fn serialize(&mut self, method_id: u64, message: &dyn Message) {
        let mut payload = Vec::new();
        message.encode(&mut payload);
        self.write_u64((WORD_SIZE + payload.len()) as u64);
        self.write_u64(method_id);
        self.write(&payload);
    }
}

//! Cursor discipline and capacity management of the elastic buffer.

use minirpc::Buffer;
use proptest::prelude::*;

#[test]
fn interleaved_writes_and_reads_round_trip() {
    let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
    let mut buffer = Buffer::new();
    let mut out = Vec::new();
    for chunk in data.chunks(37) {
        buffer.write(chunk);
        let take = buffer.readable_bytes().min(19);
        out.extend_from_slice(buffer.read(take));
    }
    while buffer.readable_bytes() > 0 {
        let take = buffer.readable_bytes().min(23);
        out.extend_from_slice(buffer.read(take));
    }
    assert_eq!(out, data);
}

#[test]
fn cursors_reset_when_fully_drained() {
    let mut buffer = Buffer::new();
    buffer.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(buffer.read(8), &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(buffer.readable_bytes(), 0);
    assert_eq!(
        buffer.writable_bytes(),
        buffer.capacity(),
        "a drained buffer must reuse its whole allocation"
    );
}

#[test]
fn compacts_before_growing() {
    let mut buffer = Buffer::with_capacity(16);
    buffer.write(&[9; 12]);
    buffer.retrieve(8);
    // 4 readable, 4 writable; compaction makes room for 10 without growing.
    buffer.write(&[7; 10]);
    assert_eq!(buffer.capacity(), 16);
    assert_eq!(buffer.readable(), [[9u8; 4].as_slice(), [7u8; 10].as_slice()].concat());
}

#[test]
fn grows_when_compaction_is_not_enough() {
    let mut buffer = Buffer::with_capacity(16);
    buffer.write(&[9; 12]);
    buffer.retrieve(2);
    buffer.write(&[7; 20]);
    assert!(buffer.capacity() > 16);
    assert_eq!(buffer.readable(), [[9u8; 10].as_slice(), [7u8; 20].as_slice()].concat());
}

#[test]
fn shrink_keeps_unread_content() {
    let mut buffer = Buffer::new();
    buffer.write(&[5; 100]);
    buffer.retrieve(40);
    buffer.shrink(4);
    assert_eq!(buffer.capacity(), 64);
    assert_eq!(buffer.readable(), &[5; 60]);
}

#[test]
fn typed_round_trip() {
    let mut buffer = Buffer::new();
    buffer.write_u64(0x0102_0304_0506_0708);
    buffer.write_u64(u64::MAX);
    assert_eq!(buffer.peek_u64(), 0x0102_0304_0506_0708);
    assert_eq!(buffer.read_u64(), 0x0102_0304_0506_0708);
    assert_eq!(buffer.read_u64(), u64::MAX);
}

#[test]
fn wire_integers_are_little_endian() {
    let mut buffer = Buffer::new();
    buffer.write_u64(1);
    assert_eq!(buffer.readable(), &[1, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
#[should_panic]
fn typed_read_requires_enough_bytes() {
    let mut buffer = Buffer::new();
    buffer.write(&[1, 2, 3]);
    buffer.read_u64();
}

proptest! {
    #[test]
    fn arbitrary_interleaving_round_trips(
        data in proptest::collection::vec(any::<u8>(), 0..512),
        write_chunk in 1usize..64,
        read_chunk in 1usize..64,
    ) {
        let mut buffer = Buffer::new();
        let mut out = Vec::new();
        let mut pending = &data[..];
        while !pending.is_empty() || buffer.readable_bytes() > 0 {
            if !pending.is_empty() {
                let n = write_chunk.min(pending.len());
                buffer.write(&pending[..n]);
                pending = &pending[n..];
            }
            let take = read_chunk.min(buffer.readable_bytes());
            out.extend_from_slice(buffer.read(take));
        }
        prop_assert_eq!(out, data);
    }

    #[test]
    fn u64_sequences_round_trip(values in proptest::collection::vec(any::<u64>(), 0..32)) {
        let mut buffer = Buffer::new();
        for value in &values {
            buffer.write_u64(*value);
        }
        let read: Vec<u64> = values.iter().map(|_| buffer.read_u64()).collect();
        prop_assert_eq!(read, values);
    }
}

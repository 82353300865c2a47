//! Buffer management for cloud file handles

use bytes::{Bytes, BytesMut};
use std::ops::Range;

/// A window of downloaded data, addressed by its range in the object
#[derive(Debug)]
pub(crate) struct ReadWindow {
    data: Bytes,
    range: Range<u64>,
}

impl ReadWindow {
    pub fn new(data: Bytes, start: u64) -> Self {
        let end = start + data.len() as u64;
        ReadWindow {
            data,
            range: start..end,
        }
    }

    pub fn contains(&self, pos: u64) -> bool {
        self.range.contains(&pos)
    }

    /// Buffered data from `pos` to the end of the window
    pub fn slice_from(&self, pos: u64) -> Option<&[u8]> {
        if !self.contains(pos) {
            return None;
        }
        let offset = (pos - self.range.start) as usize;
        Some(&self.data[offset..])
    }
}

/// Accumulates appended data until a part or the whole object is uploaded
#[derive(Debug)]
pub(crate) struct WriteBuffer {
    buffer: BytesMut,
    capacity: usize,
}

impl WriteBuffer {
    pub fn new(capacity: usize) -> Self {
        WriteBuffer {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    /// Appends as much of `data` as fits, returning the amount taken
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.remaining());
        self.buffer.extend_from_slice(&data[..take]);
        take
    }

    /// Takes the buffered contents, leaving the buffer empty
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_window_bounds() {
        let window = ReadWindow::new(Bytes::from_static(b"abcdef"), 10);
        assert!(window.contains(10));
        assert!(window.contains(15));
        assert!(!window.contains(16));
        assert_eq!(window.slice_from(12), Some(&b"cdef"[..]));
        assert_eq!(window.slice_from(16), None);
    }

    #[test]
    fn test_write_buffer_fill_and_take() {
        let mut buffer = WriteBuffer::new(4);
        assert_eq!(buffer.fill(b"abcdef"), 4);
        assert_eq!(buffer.remaining(), 0);
        assert_eq!(buffer.take(), Bytes::from_static(b"abcd"));
        assert!(buffer.is_empty());
        assert_eq!(buffer.fill(b"ef"), 2);
        assert_eq!(buffer.len(), 2);
    }
}

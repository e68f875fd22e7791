use slice_deque::SliceDeque;
use std::io;

type ByteDeque = SliceDeque<u8>;

const BUF_SIZE_INCREMENT: usize = 65536;

/// A dynamically growable, double ended byte queue. Data is appended at the tail and consumed
/// from the head. Used on both sides of every socket in the fabric: egress buffers accumulate
/// encoded frames until the kernel accepts them, ingress buffers accumulate raw bytes until a
/// full frame can be parsed out of them.
pub struct Buffer {
    data: ByteDeque,
    cap: usize,
}

impl Buffer {
    #[inline]
    pub fn new(cap: usize) -> Buffer {
        if cap % BUF_SIZE_INCREMENT != 0 {
            panic!(
                "buffer capacity must be a multiple of {}, got {}",
                BUF_SIZE_INCREMENT, cap
            );
        }

        let mut data = ByteDeque::new();
        data.reserve(cap);
        Buffer { data, cap }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.data.capacity() - self.data.len()
    }

    #[inline]
    pub fn move_head(&mut self, count: usize) {
        unsafe { self.data.move_head(count as isize) }
    }

    #[inline]
    pub fn move_tail(&mut self, count: usize) {
        unsafe { self.data.move_tail(count as isize) }
    }

    /// Slice over the readable contents of the buffer.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[inline]
    pub fn clear(&mut self) {
        let len = self.len();
        self.move_head(len);
    }

    /// Appends `bytes` to the tail, growing is not allowed beyond `cap`.
    #[inline]
    pub fn push(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.len() > self.free_capacity() {
            return Err(io::ErrorKind::WriteZero.into());
        }
        unsafe {
            let slice = self.data.tail_head_slice();
            slice[..bytes.len()].copy_from_slice(bytes);
        }
        self.move_tail(bytes.len());
        Ok(())
    }

    /// Writes the contents of the buffer into `writer`, advancing the head as bytes are
    /// accepted. Returns the number of bytes written, which may be less than `len()` if the
    /// writer would block partway through.
    #[inline]
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.data.len();

        while self.data.len() > 0 {
            let write_count = match writer.write(&self.data) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock && orig_len != self.data.len() => break,
                Err(e) => return Err(e),
            };

            self.move_head(write_count);
        }

        Ok(orig_len - self.data.len())
    }

    /// Reads as much as possible from `reader` into the buffer without exceeding `cap`.
    #[inline]
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let orig_capacity = self.free_capacity();

        while self.data.len() < self.cap {
            unsafe {
                let read_count = reader.read(self.data.tail_head_slice())?;

                if read_count == 0 {
                    return Ok(orig_capacity - self.free_capacity());
                }

                self.move_tail(read_count);
            }
        }

        Err(io::Error::new(io::ErrorKind::Other, "buffer overrun"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::min;

    struct MockChannel {
        data: Vec<u8>,
        cursor: usize,
        chunk: usize,
        max_size: usize,
    }

    impl MockChannel {
        fn new(data: Vec<u8>, chunk: usize, max_size: usize) -> MockChannel {
            MockChannel { data, cursor: 0, chunk, max_size }
        }

        fn clear(&mut self) {
            self.data.clear();
            self.cursor = 0;
        }
    }

    impl io::Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cursor == self.data.len() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let offset = min(min(self.chunk, buf.len()), self.data.len() - self.cursor);
            buf[..offset].copy_from_slice(&self.data[self.cursor..self.cursor + offset]);
            self.cursor += offset;
            Ok(offset)
        }
    }

    impl io::Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.data.len() == self.max_size {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let count = min(self.chunk, buf.len());
            self.data.extend(&buf[..count]);
            Ok(count)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn roundtrips_through_a_chunked_channel() {
        let mock_data: Vec<_> = (0..BUF_SIZE_INCREMENT / 2).map(|b| b as u8).collect();
        let mut channel = MockChannel::new(mock_data.clone(), 500, mock_data.len());
        let mut buffer = Buffer::new(BUF_SIZE_INCREMENT);

        let err = buffer.ingress(&mut channel).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(buffer.read_slice(), &mock_data[..]);

        channel.clear();
        let count = buffer.egress(&mut channel).unwrap();

        assert_eq!(count, mock_data.len());
        assert_eq!(buffer.len(), 0);
        assert_eq!(channel.data, mock_data);
    }

    #[test]
    fn ingress_reports_overrun() {
        let mock_data: Vec<_> = (0..BUF_SIZE_INCREMENT * 2).map(|b| b as u8).collect();
        let mut buffer = Buffer::new(BUF_SIZE_INCREMENT);

        let err = buffer.ingress(&mock_data[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn push_respects_free_capacity() {
        let mut buffer = Buffer::new(BUF_SIZE_INCREMENT);
        let big = vec![0u8; BUF_SIZE_INCREMENT + 1];
        assert!(buffer.push(&big).is_err());

        let small = vec![1u8, 2, 3];
        buffer.push(&small).unwrap();
        assert_eq!(buffer.read_slice(), &small[..]);
    }

    #[test]
    #[should_panic(expected = "buffer capacity must be a multiple of 65536, got 100000")]
    fn rejects_misaligned_capacity() {
        let _ = Buffer::new(100000);
    }
}

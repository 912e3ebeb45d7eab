/// Receive arena alignment, one cache line.
pub const ALIGN: usize = 64;

/// Arena that successive datagrams are received into.
///
/// Each datagram starts on a cache line boundary. Once less than one maximum-sized packet of room
/// remains before the end, writing wraps back to the start.
#[derive(Debug)]
pub struct ScratchBuffer {
    data: Vec<u8>,
    start: usize,
    len: usize,
    packet_size: usize,
    offset: usize,
}

impl ScratchBuffer {
    /// `size` is clamped up to `packet_size` so at least one packet always fits.
    pub fn new(size: usize, packet_size: usize) -> ScratchBuffer {
        let len = size.max(packet_size);
        let data = vec![0u8; len + ALIGN - 1];
        let start = data.as_ptr().align_offset(ALIGN);
        ScratchBuffer {
            data,
            start,
            len,
            packet_size,
            offset: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The region the next datagram is read into.
    #[inline]
    pub fn slot(&mut self) -> &mut [u8] {
        let begin = self.start + self.offset;
        &mut self.data[begin..begin + self.packet_size]
    }

    /// Moves past a datagram of `received` bytes.
    #[inline]
    pub fn advance(&mut self, received: usize) {
        self.offset = (self.offset + received + ALIGN - 1) & !(ALIGN - 1);
        if self.offset >= self.len - self.packet_size {
            self.offset = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_cache_aligned() {
        let mut buf = ScratchBuffer::new(16384, 1500);
        for &n in &[1usize, 63, 64, 65, 999] {
            let addr = buf.slot().as_ptr() as usize;
            assert_eq!(addr % ALIGN, 0);
            assert_eq!(buf.slot().len(), 1500);
            buf.advance(n);
        }
    }

    #[test]
    fn offset_rounds_up() {
        let mut buf = ScratchBuffer::new(16384, 1500);
        buf.advance(1);
        assert_eq!(buf.offset(), 64);
        buf.advance(64);
        assert_eq!(buf.offset(), 128);
        buf.advance(0);
        assert_eq!(buf.offset(), 128);
    }

    #[test]
    fn wraps_before_running_off_the_end() {
        let mut buf = ScratchBuffer::new(4096, 1024);
        buf.advance(1024);
        buf.advance(1024);
        assert_eq!(buf.offset(), 2048);
        buf.advance(1000);
        assert_eq!(buf.offset(), 0);
    }

    #[test]
    fn single_packet_arena_always_restarts() {
        let mut buf = ScratchBuffer::new(0, 16384);
        assert_eq!(buf.slot().len(), 16384);
        buf.advance(100);
        assert_eq!(buf.offset(), 0);
    }
}

//! Consumer side of a TPACKET_V3 receive ring.
//!
//! The kernel and this process hand blocks back and forth through the `block_status` word at the
//! head of each block. The kernel fills a block, then publishes it by setting `TP_STATUS_USER`.
//! We observe that flag with an acquire load before touching anything else in the block, and give
//! the block back by storing `TP_STATUS_KERNEL` with release ordering once every read of it is
//! done. No other synchronisation exists between the two sides.

use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::tpacket::{
    tpacket3_hdr, tpacket_block_desc, tpacket_req3, BLOCK_STATUS_OFFSET, TPACKET_ALIGNMENT,
    TP_STATUS_KERNEL, TP_STATUS_USER,
};
use crate::util::is_pow_of_two;

/// Geometry of a receive ring. The same for every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    pub block_size: u32,
    pub frame_size: u32,
    pub block_nr: u32,
    /// Milliseconds after which the kernel retires a partially filled block.
    pub retire_timeout_ms: u32,
}

impl Default for RingConfig {
    fn default() -> RingConfig {
        RingConfig {
            block_size: 1 << 22,
            frame_size: 1 << 11,
            block_nr: 64,
            retire_timeout_ms: 60,
        }
    }
}

impl RingConfig {
    pub fn frame_nr(&self) -> u32 {
        (self.block_size / self.frame_size) * self.block_nr
    }

    pub fn map_len(&self) -> usize {
        self.block_size as usize * self.block_nr as usize
    }

    pub fn validate(&self, page_size: usize) -> Result<()> {
        if !is_pow_of_two(self.block_size) || (self.block_size as usize) < page_size {
            return Err(Error::Config(format!(
                "ring block size {} must be a power of two and at least one page ({})",
                self.block_size, page_size
            )));
        }
        if self.frame_size == 0
            || self.frame_size as usize % TPACKET_ALIGNMENT != 0
            || self.block_size % self.frame_size != 0
        {
            return Err(Error::Config(format!(
                "ring frame size {} must be a multiple of {} dividing the block size",
                self.frame_size, TPACKET_ALIGNMENT
            )));
        }
        if self.block_nr == 0 {
            return Err(Error::Config("ring needs at least one block".to_string()));
        }
        Ok(())
    }

    pub(crate) fn to_req(&self) -> tpacket_req3 {
        tpacket_req3 {
            tp_block_size: self.block_size,
            tp_block_nr: self.block_nr,
            tp_frame_size: self.frame_size,
            tp_frame_nr: self.frame_nr(),
            tp_retire_blk_tov: self.retire_timeout_ms,
            tp_sizeof_priv: 0,
            tp_feature_req_word: 0,
        }
    }
}

/// Blocks the consumer until the ring may have progressed.
pub trait Wait {
    fn wait(&mut self) -> Result<()>;
}

/// Walks the blocks of a mapped ring in order, one at a time.
#[derive(Debug)]
pub struct RingConsumer {
    base: NonNull<u8>,
    block_size: usize,
    block_nr: usize,
    cursor: usize,
}

// The consumer is the only user-space reader of its ring.
unsafe impl Send for RingConsumer {}

impl RingConsumer {
    /// # Safety
    ///
    /// `base` must point to `block_size * block_nr` bytes laid out as a TPACKET_V3 ring, aligned
    /// to 8 bytes, that stay valid for the life of the consumer. No other consumer may walk the
    /// same ring.
    pub unsafe fn new(base: NonNull<u8>, block_size: usize, block_nr: usize) -> RingConsumer {
        debug_assert!(block_nr > 0);
        debug_assert_eq!(base.as_ptr() as usize % mem::align_of::<tpacket_block_desc>(), 0);
        RingConsumer {
            base,
            block_size,
            block_nr,
            cursor: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    fn block_ptr(&self, index: usize) -> *mut u8 {
        unsafe { self.base.as_ptr().add(index * self.block_size) }
    }

    #[inline]
    fn status(&self, index: usize) -> &AtomicU32 {
        unsafe { &*(self.block_ptr(index).add(BLOCK_STATUS_OFFSET) as *const AtomicU32) }
    }

    /// Whether the block under the cursor has been handed to user space.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status(self.cursor).load(Ordering::Acquire) & TP_STATUS_USER != 0
    }

    /// Returns the block under the cursor if the kernel has released it.
    pub fn try_next(&mut self) -> Option<BlockGuard<'_>> {
        if self.is_ready() {
            Some(BlockGuard::new(self))
        } else {
            None
        }
    }

    /// Waits until the block under the cursor is user-owned and returns it.
    ///
    /// `waiter` is the only place this blocks; the flag is re-checked after every wake.
    pub fn next_block<W: Wait>(&mut self, waiter: &mut W) -> Result<BlockGuard<'_>> {
        while !self.is_ready() {
            waiter.wait()?;
        }
        Ok(BlockGuard::new(self))
    }
}

/// A block currently owned by user space.
///
/// Dropping the guard returns the block to the kernel and moves the cursor on.
pub struct BlockGuard<'a> {
    ring: &'a mut RingConsumer,
    block: *const u8,
    num_pkts: u32,
    first: usize,
}

impl<'a> BlockGuard<'a> {
    fn new(ring: &'a mut RingConsumer) -> BlockGuard<'a> {
        let block = ring.block_ptr(ring.cursor) as *const u8;
        // Only read after the acquire load in is_ready() saw TP_STATUS_USER.
        let (num_pkts, first) = unsafe {
            let desc = block as *const tpacket_block_desc;
            (
                ptr::read(ptr::addr_of!((*desc).hdr.num_pkts)),
                ptr::read(ptr::addr_of!((*desc).hdr.offset_to_first_pkt)) as usize,
            )
        };
        BlockGuard {
            ring,
            block,
            num_pkts,
            first,
        }
    }

    pub fn index(&self) -> usize {
        self.ring.cursor
    }

    pub fn num_packets(&self) -> u32 {
        self.num_pkts
    }

    /// Sequence number the kernel stamped on this block.
    pub fn seq_num(&self) -> u64 {
        unsafe {
            let desc = self.block as *const tpacket_block_desc;
            ptr::read(ptr::addr_of!((*desc).hdr.seq_num))
        }
    }

    /// Reloads the ownership flag. Always user-owned while the guard lives.
    pub fn status(&self) -> u32 {
        self.ring.status(self.ring.cursor).load(Ordering::Acquire)
    }

    pub fn packets(&self) -> Packets<'_> {
        Packets {
            block: self.block,
            block_size: self.ring.block_size,
            offset: self.first,
            remaining: self.num_pkts,
            _guard: std::marker::PhantomData,
        }
    }
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        // Every read of the block above happens-before the kernel may refill it.
        self.ring
            .status(self.ring.cursor)
            .store(TP_STATUS_KERNEL, Ordering::Release);
        self.ring.cursor = (self.ring.cursor + 1) % self.ring.block_nr;
    }
}

/// One packet inside a user-owned block.
#[derive(Debug, Clone, Copy)]
pub struct RingPacket<'a> {
    /// Bytes captured, starting at the Ethernet header.
    pub frame: &'a [u8],
    /// Original length on the wire.
    pub wire_len: u32,
    pub snap_len: u32,
}

impl RingPacket<'_> {
    pub fn truncated(&self) -> bool {
        self.snap_len != self.wire_len
    }
}

/// Iterator over the linked list of packet headers in a block.
pub struct Packets<'g> {
    block: *const u8,
    block_size: usize,
    offset: usize,
    remaining: u32,
    _guard: std::marker::PhantomData<&'g [u8]>,
}

impl<'g> Iterator for Packets<'g> {
    type Item = RingPacket<'g>;

    fn next(&mut self) -> Option<RingPacket<'g>> {
        if self.remaining == 0 || self.offset + mem::size_of::<tpacket3_hdr>() > self.block_size {
            return None;
        }
        self.remaining -= 1;

        let hdr: tpacket3_hdr =
            unsafe { ptr::read_unaligned(self.block.add(self.offset) as *const tpacket3_hdr) };

        let mac = self.offset + usize::from(hdr.tp_mac);
        let snap_len = (hdr.tp_snaplen as usize).min(self.block_size.saturating_sub(mac));
        let frame = unsafe { std::slice::from_raw_parts(self.block.add(mac), snap_len) };

        if hdr.tp_next_offset == 0 {
            self.remaining = 0;
        } else {
            self.offset += hdr.tp_next_offset as usize;
        }

        Some(RingPacket {
            frame,
            wire_len: hdr.tp_len,
            snap_len: hdr.tp_snaplen,
        })
    }
}

//
// Helpers that lay out TPACKET_V3 blocks in ordinary memory the way the kernel does, so the ring
// consumer can be driven without a real packet socket.
//
#![allow(dead_code)]

use std::mem;
use std::ptr;
use std::sync::atomic::AtomicU32;

use pnet::packet::ethernet::{EtherType, EtherTypes, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::MutableIpv4Packet;
use pnet::packet::udp::MutableUdpPacket;

use udpcount::packet::{ETH_HLEN, HEADER_OVERHEAD, IPV4_HLEN};
use udpcount::tpacket::{
    tpacket3_hdr, tpacket_block_desc, BLOCK_STATUS_OFFSET, TPACKET_ALIGNMENT,
};

/// Bytes the simulated kernel copies from each frame.
pub const SNAP_LEN: usize = 256;

/// A frame to place in a block.
#[derive(Debug, Clone)]
pub struct TestFrame {
    pub wire_len: u32,
    pub ethertype: EtherType,
    pub marker: u8,
}

impl TestFrame {
    pub fn udp(wire_len: u32, marker: u8) -> TestFrame {
        TestFrame {
            wire_len,
            ethertype: EtherTypes::Ipv4,
            marker,
        }
    }

    pub fn captured_len(&self) -> usize {
        (self.wire_len as usize).min(SNAP_LEN)
    }

    pub fn truncated(&self) -> bool {
        self.captured_len() != self.wire_len as usize
    }

    /// The UDP payload bytes the ring backend credits for this frame, if any.
    pub fn expected_payload(&self) -> Option<usize> {
        if self.ethertype == EtherTypes::Ipv4 {
            Some(self.wire_len as usize - HEADER_OVERHEAD)
        } else {
            None
        }
    }

    /// Builds the captured bytes: Ethernet, IPv4, UDP headers and a payload filled with `marker`.
    pub fn bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.captured_len()];

        {
            let mut eth = MutableEthernetPacket::new(&mut buf[..]).unwrap();
            eth.set_ethertype(self.ethertype);
        }
        {
            let mut ip = MutableIpv4Packet::new(&mut buf[ETH_HLEN..]).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((self.wire_len as usize - ETH_HLEN) as u16);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
        }
        {
            let mut udp = MutableUdpPacket::new(&mut buf[ETH_HLEN + IPV4_HLEN..]).unwrap();
            udp.set_destination(8888);
            udp.set_length((self.wire_len as usize - ETH_HLEN - IPV4_HLEN) as u16);
        }
        for b in &mut buf[HEADER_OVERHEAD..] {
            *b = self.marker;
        }

        buf
    }
}

fn align(val: usize) -> usize {
    (val + TPACKET_ALIGNMENT - 1) & !(TPACKET_ALIGNMENT - 1)
}

/// Writes `frames` into the block at `block` without touching its status word.
///
/// # Safety
///
/// `block` must point to `block_size` writable bytes, 8-byte aligned, that no one else accesses.
pub unsafe fn write_block(block: *mut u8, block_size: usize, seq: u64, frames: &[TestFrame]) {
    let first = align(mem::size_of::<tpacket_block_desc>());
    let desc = block as *mut tpacket_block_desc;
    ptr::write(ptr::addr_of_mut!((*desc).version), 3);
    ptr::write(ptr::addr_of_mut!((*desc).hdr.num_pkts), frames.len() as u32);
    ptr::write(ptr::addr_of_mut!((*desc).hdr.offset_to_first_pkt), first as u32);
    ptr::write(ptr::addr_of_mut!((*desc).hdr.seq_num), seq);

    let mut offset = first;
    for (i, frame) in frames.iter().enumerate() {
        let bytes = frame.bytes();
        let mac = align(mem::size_of::<tpacket3_hdr>());
        let next = align(mac + bytes.len());
        assert!(offset + next <= block_size, "frames do not fit in the block");

        let mut hdr: tpacket3_hdr = mem::zeroed();
        hdr.tp_next_offset = if i + 1 == frames.len() { 0 } else { next as u32 };
        hdr.tp_snaplen = bytes.len() as u32;
        hdr.tp_len = frame.wire_len;
        hdr.tp_mac = mac as u16;
        hdr.tp_net = (mac + ETH_HLEN) as u16;
        ptr::write_unaligned(block.add(offset) as *mut tpacket3_hdr, hdr);
        ptr::copy_nonoverlapping(bytes.as_ptr(), block.add(offset + mac), bytes.len());

        offset += next;
    }
}

/// The ownership word of block `index`.
///
/// # Safety
///
/// `base` must point to a ring of at least `index + 1` blocks of `block_size` bytes.
pub unsafe fn block_status<'a>(base: *mut u8, block_size: usize, index: usize) -> &'a AtomicU32 {
    &*(base.add(index * block_size + BLOCK_STATUS_OFFSET) as *const AtomicU32)
}

/// A raw ring pointer that may be handed to the simulated kernel thread.
#[derive(Clone, Copy)]
pub struct RingPtr(pub *mut u8);
unsafe impl Send for RingPtr {}

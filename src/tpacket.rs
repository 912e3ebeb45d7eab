//! TPACKET_V3 definitions from `<linux/if_packet.h>`.
//!
//! Everything comes from `libc` except the block descriptor, whose header sits behind a
//! single-member union there.
#![allow(non_camel_case_types)]

use libc::c_int;

pub use libc::{
    tpacket3_hdr, tpacket_hdr_v1, tpacket_req3, PACKET_FANOUT, PACKET_FANOUT_CPU, PACKET_RX_RING,
    PACKET_VERSION, TPACKET_ALIGNMENT, TP_STATUS_KERNEL, TP_STATUS_USER,
};

pub const TPACKET_V3: c_int = libc::tpacket_versions::TPACKET_V3 as c_int;

/// Header at the start of every ring block.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct tpacket_block_desc {
    pub version: u32,
    pub offset_to_priv: u32,
    pub hdr: tpacket_hdr_v1,
}

/// Byte offset of `block_status` from the start of a block.
pub const BLOCK_STATUS_OFFSET: usize = 8;

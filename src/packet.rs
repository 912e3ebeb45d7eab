//! Header arithmetic for recovering the UDP payload length of a captured Ethernet frame.

pub const ETH_HLEN: usize = 14;
pub const IPV4_HLEN: usize = 20;
pub const UDP_HLEN: usize = 8;
pub const ETH_P_IP: u16 = 0x0800;

/// Bytes of Ethernet, option-less IPv4 and UDP headers in front of the payload.
pub const HEADER_OVERHEAD: usize = ETH_HLEN + IPV4_HLEN + UDP_HLEN;

/// Payload length of a frame delivered by libpcap.
///
/// Uses the captured length and the IHL nibble of the IPv4 header, so IP options are accounted
/// for. Frames too short to hold the headers yield `None`.
pub fn pcap_payload_len(frame: &[u8]) -> Option<usize> {
    if frame.len() <= ETH_HLEN {
        return None;
    }
    let ip = &frame[ETH_HLEN..];
    let ip_hlen = usize::from(ip[0] & 0x0f) * 4;
    ip.len().checked_sub(ip_hlen + UDP_HLEN)
}

/// Payload length of a frame delivered through the packet ring.
///
/// Only IPv4 without options is understood. Anything else (IPv6, IP options, other
/// ethertypes) returns `None` and is dropped from every counter, including errors.
/// `wire_len` is the original frame length, which may exceed `frame.len()` for truncated frames.
pub fn ring_payload_len(frame: &[u8], wire_len: usize) -> Option<usize> {
    if frame.len() <= ETH_HLEN {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != ETH_P_IP {
        return None;
    }
    let ip_hlen = usize::from(frame[ETH_HLEN] & 0x0f) * 4;
    if ip_hlen != IPV4_HLEN {
        return None;
    }
    wire_len.checked_sub(HEADER_OVERHEAD)
}

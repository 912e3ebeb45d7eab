use std::convert::TryFrom;
use std::time::Instant;

use pcap::{Active, Capture, Direction, Linktype, PacketHeader};
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::LocalMetrics;
use crate::packet::pcap_payload_len;
use crate::report::{Reporter, REPORT_INTERVAL};

/// Read timeout handed to libpcap, in milliseconds.
pub const READ_TIMEOUT_MS: i32 = 10;

/// Credits one captured frame to `metrics`.
///
/// Truncation is judged on the link-layer lengths recorded by the kernel, so it is exact here.
pub fn record_frame(metrics: &LocalMetrics, header: &PacketHeader, data: &[u8]) {
    let captured = (header.caplen as usize).min(data.len());
    if let Some(len) = pcap_payload_len(&data[..captured]) {
        metrics.add_packet(len, header.len != header.caplen);
    }
}

/// libpcap takes sizes as C ints.
fn pcap_int(what: &str, val: usize) -> Result<i32> {
    i32::try_from(val)
        .map_err(|_| Error::Config(format!("{} {} is too large for libpcap", what, val)))
}

/// Sniffs inbound UDP on one interface through libpcap.
pub struct PcapBackend {
    capture: Capture<Active>,
    metrics: LocalMetrics,
}

impl PcapBackend {
    pub fn start(config: &Config) -> Result<PcapBackend> {
        let interface = config.interface.as_str();

        let snaplen = pcap_int("packet size", config.packet_size)?;
        let mut inactive = Capture::from_device(interface)
            .map_err(Error::pcap("create"))?
            .snaplen(snaplen)
            .timeout(READ_TIMEOUT_MS);
        if config.socket_size != 0 {
            inactive = inactive.buffer_size(pcap_int("socket size", config.socket_size)?);
        }
        let mut capture = inactive.open().map_err(Error::pcap("activate"))?;

        capture
            .set_datalink(Linktype::ETHERNET)
            .map_err(Error::pcap("set datalink"))?;
        capture
            .direction(Direction::In)
            .map_err(Error::pcap("set direction"))?;

        let filter = config.pcap_filter();
        capture
            .filter(&filter, true)
            .map_err(Error::pcap("filter"))?;
        info!(interface, %filter, "capturing with libpcap");

        Ok(PcapBackend {
            capture,
            metrics: LocalMetrics::new(),
        })
    }

    pub fn run(mut self) -> Result<()> {
        let mut reporter = Reporter::new(Instant::now());

        loop {
            match self.capture.next_packet() {
                Ok(packet) => record_frame(&self.metrics, packet.header, packet.data),
                Err(pcap::Error::TimeoutExpired) => {}
                Err(err) => return Err(Error::Pcap { op: "read", source: err }),
            }

            let now = Instant::now();
            if now.duration_since(reporter.last_report()) >= REPORT_INTERVAL {
                reporter.tick(&self.metrics, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(caplen: u32, len: u32) -> PacketHeader {
        PacketHeader {
            ts: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            caplen,
            len,
        }
    }

    fn ipv4_frame(len: usize) -> Vec<u8> {
        let mut f = vec![0u8; len];
        f[12] = 0x08;
        f[14] = 0x45;
        f
    }

    #[test]
    fn payload_of_minimal_ipv4_frame() {
        let m = LocalMetrics::new();
        record_frame(&m, &header(100, 100), &ipv4_frame(100));
        assert_eq!(m.packets(), 1);
        assert_eq!(m.bytes(), 58);
        assert_eq!(m.truncated(), 0);
    }

    #[test]
    fn snapshot_shorter_than_wire_is_truncated() {
        let m = LocalMetrics::new();
        record_frame(&m, &header(64, 9000), &ipv4_frame(64));
        assert_eq!(m.truncated(), 1);
        assert_eq!(m.bytes(), 64 - 42);
    }

    #[test]
    fn oversized_lengths_are_rejected() {
        assert_eq!(pcap_int("packet size", 16384).unwrap(), 16384);
        assert!(matches!(
            pcap_int("packet size", i32::MAX as usize + 1),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn start_rejects_snaplen_above_c_int() {
        let config = Config {
            interface: "lo".to_string(),
            packet_size: 1 << 32,
            ..Config::default()
        };
        assert!(matches!(PcapBackend::start(&config), Err(Error::Config(_))));
    }

    #[test]
    fn runt_frames_are_ignored() {
        let m = LocalMetrics::new();
        record_frame(&m, &header(14, 14), &ipv4_frame(14));
        record_frame(&m, &header(30, 30), &ipv4_frame(30));
        assert_eq!(m.packets(), 0);
        assert_eq!(m.errors(), 0);
    }
}

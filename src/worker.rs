use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use core_affinity::CoreId;
use tracing::{debug, warn};

use crate::error::Result;
use crate::metrics::{LocalMetrics, SharedMetrics};
use crate::mmap_area::MmapArea;
use crate::packet::ring_payload_len;
use crate::raw_socket::{FdPoller, RawSocket};
use crate::ring::{BlockGuard, RingConfig, RingConsumer};
use crate::tpacket::{PACKET_FANOUT_CPU, TPACKET_V3};

/// A raw socket together with its mapped receive ring.
///
/// The mapping is released before the socket is closed. If setup fails part way, whatever was
/// already acquired is released on return.
#[derive(Debug)]
pub struct PacketRing {
    area: MmapArea,
    socket: RawSocket,
    config: RingConfig,
}

impl PacketRing {
    pub fn open(config: &RingConfig, interface: Option<&str>, fanout_group: u16) -> Result<PacketRing> {
        let socket = RawSocket::new()?;
        if let Some(name) = interface {
            socket.bind_interface(name)?;
        }
        socket.join_fanout(fanout_group, PACKET_FANOUT_CPU)?;
        socket.set_version(TPACKET_V3)?;
        socket.set_rx_ring(&config.to_req())?;
        let area = MmapArea::map_socket(socket.as_raw_fd(), config.map_len())?;

        Ok(PacketRing {
            area,
            socket,
            config: *config,
        })
    }

    fn consumer(&self) -> RingConsumer {
        unsafe {
            RingConsumer::new(
                self.area.as_ptr(),
                self.config.block_size as usize,
                self.config.block_nr as usize,
            )
        }
    }
}

/// Credits every supported packet of `block` to `metrics`. Returns the number credited.
pub fn count_block(block: &BlockGuard<'_>, metrics: &LocalMetrics) -> usize {
    let mut counted = 0;
    for pkt in block.packets() {
        if let Some(len) = ring_payload_len(pkt.frame, pkt.wire_len as usize) {
            metrics.add_packet(len, pkt.truncated());
            counted += 1;
        }
    }
    counted
}

/// One capture thread: a ring, the CPU it is pinned to and the shared counters it feeds.
pub struct Worker {
    cpu: CoreId,
    ring: PacketRing,
    shared: Arc<SharedMetrics>,
}

impl Worker {
    pub fn new(cpu: CoreId, ring: PacketRing, shared: Arc<SharedMetrics>) -> Worker {
        Worker { cpu, ring, shared }
    }

    pub fn cpu(&self) -> usize {
        self.cpu.id
    }

    /// Consumes blocks forever. Only returns if waiting on the socket fails.
    pub fn run(self) -> Result<()> {
        if !core_affinity::set_for_current(self.cpu) {
            warn!(cpu = self.cpu.id, "could not pin ring worker");
        }
        debug!(cpu = self.cpu.id, "ring worker started");

        let mut poller = FdPoller::new(self.ring.socket.as_raw_fd(), self.cpu.id);
        let mut consumer = self.ring.consumer();

        loop {
            let block = consumer.next_block(&mut poller)?;
            let local = LocalMetrics::new();
            count_block(&block, &local);
            self.shared.merge(&local);
            drop(block);
        }
    }
}

use structopt::StructOpt;

use crate::error::{Error, Result};
use crate::ring::RingConfig;

/// Which capture strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Socket,
    Pcap,
    Ring,
}

/// Run parameters. Fixed for the life of the process.
#[derive(StructOpt, Debug, Clone)]
#[structopt(name = "udpcount", about = "Count UDP packets and throughput arriving on a port")]
pub struct Config {
    /// Destination host (empty for any address)
    #[structopt(long, default_value = "")]
    pub host: String,

    /// Destination port
    #[structopt(long, default_value = "8888")]
    pub port: u16,

    /// Receive buffer size (0 for system default)
    #[structopt(long, default_value = "0")]
    pub socket_size: usize,

    /// Maximum packet size
    #[structopt(long, default_value = "16384")]
    pub packet_size: usize,

    /// Size of receive arena (0 for packet size)
    #[structopt(long, default_value = "0")]
    pub buffer_size: usize,

    /// Make up to this many synchronous reads per wakeup
    #[structopt(long, default_value = "0")]
    pub poll: usize,

    /// Use libpcap on this interface
    #[structopt(short = "i", long, default_value = "")]
    pub interface: String,

    /// Use a TPACKET_V3 ring per CPU instead of a socket or libpcap
    #[structopt(long)]
    pub ring: bool,

    /// Number of blocks in each ring
    #[structopt(long, default_value = "64")]
    pub ring_blocks: u32,

    /// Size of each ring block in bytes
    #[structopt(long, default_value = "4194304")]
    pub ring_block_size: u32,

    /// Ring frame size in bytes
    #[structopt(long, default_value = "2048")]
    pub ring_frame_size: u32,

    /// Milliseconds before the kernel retires a partially filled block
    #[structopt(long, default_value = "60")]
    pub ring_timeout: u32,
}

impl Default for Config {
    fn default() -> Config {
        let ring = RingConfig::default();
        Config {
            host: String::new(),
            port: 8888,
            socket_size: 0,
            packet_size: 16384,
            buffer_size: 0,
            poll: 0,
            interface: String::new(),
            ring: false,
            ring_blocks: ring.block_nr,
            ring_block_size: ring.block_size,
            ring_frame_size: ring.frame_size,
            ring_timeout: ring.retire_timeout_ms,
        }
    }
}

impl Config {
    pub fn backend_kind(&self) -> BackendKind {
        if self.ring {
            BackendKind::Ring
        } else if !self.interface.is_empty() {
            BackendKind::Pcap
        } else {
            BackendKind::Socket
        }
    }

    pub fn interface(&self) -> Option<&str> {
        if self.interface.is_empty() {
            None
        } else {
            Some(&self.interface)
        }
    }

    pub fn host(&self) -> Option<&str> {
        if self.host.is_empty() {
            None
        } else {
            Some(&self.host)
        }
    }

    pub fn scratch_size(&self) -> usize {
        self.packet_size.max(self.buffer_size)
    }

    pub fn ring_config(&self) -> RingConfig {
        RingConfig {
            block_size: self.ring_block_size,
            frame_size: self.ring_frame_size,
            block_nr: self.ring_blocks,
            retire_timeout_ms: self.ring_timeout,
        }
    }

    /// libpcap filter matching UDP sent to the configured port and host.
    pub fn pcap_filter(&self) -> String {
        let mut program = format!("udp dst port {}", self.port);
        if let Some(host) = self.host() {
            program.push_str(" and dst host ");
            program.push_str(host);
        }
        program
    }

    pub fn validate(&self) -> Result<()> {
        if self.packet_size == 0 {
            return Err(Error::Config("packet size must be non-zero".to_string()));
        }
        if self.ring {
            self.ring_config().validate(crate::util::page_size())?;
        }
        Ok(())
    }
}

use tracing::info;

use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::pcap_backend::PcapBackend;
use crate::ring_backend::RingBackend;
use crate::socket_backend::SocketBackend;

/// A capture strategy: acquire resources up front, then count packets until failure.
pub trait Capture: Sized {
    fn start(config: &Config) -> Result<Self>;
    fn run(self) -> Result<()>;
}

impl Capture for SocketBackend {
    fn start(config: &Config) -> Result<Self> {
        SocketBackend::start(config)
    }

    fn run(self) -> Result<()> {
        SocketBackend::run(self)
    }
}

impl Capture for PcapBackend {
    fn start(config: &Config) -> Result<Self> {
        PcapBackend::start(config)
    }

    fn run(self) -> Result<()> {
        PcapBackend::run(self)
    }
}

impl Capture for RingBackend {
    fn start(config: &Config) -> Result<Self> {
        RingBackend::start(config)
    }

    fn run(self) -> Result<()> {
        RingBackend::run(self)
    }
}

/// The backend selected by the configuration.
pub enum Backend {
    Socket(SocketBackend),
    Pcap(PcapBackend),
    Ring(RingBackend),
}

impl Capture for Backend {
    fn start(config: &Config) -> Result<Backend> {
        let kind = config.backend_kind();
        info!(?kind, "starting capture backend");
        Ok(match kind {
            BackendKind::Socket => Backend::Socket(SocketBackend::start(config)?),
            BackendKind::Pcap => Backend::Pcap(PcapBackend::start(config)?),
            BackendKind::Ring => Backend::Ring(RingBackend::start(config)?),
        })
    }

    fn run(self) -> Result<()> {
        match self {
            Backend::Socket(b) => b.run(),
            Backend::Pcap(b) => b.run(),
            Backend::Ring(b) => b.run(),
        }
    }
}

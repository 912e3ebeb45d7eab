use std::io;

use thiserror::Error;

/// Errors surfaced while setting up or running a capture backend.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not resolve {host}:{port} to an IPv4 address")]
    Resolve { host: String, port: u16 },

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("no CPU cores available for ring workers")]
    NoCpus,

    #[error("{op} failed: {source}")]
    Setup {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("pcap {op} failed: {source}")]
    Pcap {
        op: &'static str,
        #[source]
        source: pcap::Error,
    },

    #[error("poll on ring socket for cpu {cpu} failed: {source}")]
    PollFailed {
        cpu: usize,
        #[source]
        source: io::Error,
    },

    #[error("ring worker for cpu {cpu} exited unexpectedly")]
    WorkerExited { cpu: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds a `Setup` error from the calling thread's current errno.
    pub(crate) fn last_os(op: &'static str) -> Error {
        Error::Setup {
            op,
            source: io::Error::from_raw_os_error(errno::errno().0),
        }
    }

    pub(crate) fn pcap(op: &'static str) -> impl FnOnce(pcap::Error) -> Error {
        move |source| Error::Pcap { op, source }
    }
}

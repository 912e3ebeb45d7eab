use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::runtime::{Builder, Runtime};
use tokio::time::sleep_until;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::LocalMetrics;
use crate::report::{ReportSchedule, Reporter};
use crate::scratch::ScratchBuffer;

/// Whether a datagram of `received` bytes is counted as truncated.
///
/// A datagram that exactly fills the read slot cannot be told apart from one that was cut short,
/// so both are counted as truncated.
#[inline]
pub fn is_truncated(received: usize, packet_size: usize) -> bool {
    received == packet_size
}

/// Resolves the bind address, preferring IPv4. An empty host binds to every address.
pub fn resolve(host: Option<&str>, port: u16) -> Result<SocketAddr> {
    let host = host.unwrap_or("0.0.0.0");
    let resolve_err = || Error::Resolve {
        host: host.to_string(),
        port,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(|_| resolve_err())?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(resolve_err)
}

/// Receives datagrams on one non-blocking UDP socket from a single-threaded event loop.
pub struct SocketBackend {
    runtime: Runtime,
    receiver: Receiver,
}

impl SocketBackend {
    pub fn start(config: &Config) -> Result<SocketBackend> {
        let addr = resolve(config.host(), config.port)?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|source| Error::Setup { op: "socket", source })?;
        socket
            .bind(&addr.into())
            .map_err(|source| Error::Setup { op: "bind", source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| Error::Setup { op: "set_nonblocking", source })?;

        if config.socket_size != 0 {
            socket
                .set_recv_buffer_size(config.socket_size)
                .map_err(|source| Error::Setup { op: "SO_RCVBUF", source })?;
            let actual = socket
                .recv_buffer_size()
                .map_err(|source| Error::Setup { op: "SO_RCVBUF", source })?;
            if actual != config.socket_size {
                warn!(
                    requested = config.socket_size,
                    actual, "socket receive buffer size differs from the requested size"
                );
            }
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| Error::Setup { op: "runtime", source })?;
        let socket = {
            let _guard = runtime.enter();
            UdpSocket::from_std(socket.into())
                .map_err(|source| Error::Setup { op: "register socket", source })?
        };
        info!(%addr, "listening with UDP socket");

        Ok(SocketBackend {
            runtime,
            receiver: Receiver {
                socket,
                scratch: ScratchBuffer::new(config.scratch_size(), config.packet_size),
                packet_size: config.packet_size,
                poll: config.poll,
                metrics: LocalMetrics::new(),
            },
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.receiver.socket.local_addr()?)
    }

    pub fn run(self) -> Result<()> {
        let SocketBackend {
            runtime,
            mut receiver,
        } = self;
        runtime.block_on(receiver.event_loop())
    }
}

struct Receiver {
    socket: UdpSocket,
    scratch: ScratchBuffer,
    packet_size: usize,
    poll: usize,
    metrics: LocalMetrics,
}

impl Receiver {
    async fn event_loop(&mut self) -> Result<()> {
        let start = Instant::now();
        let mut schedule = ReportSchedule::starting_at(start);
        let mut reporter = Reporter::new(start);

        loop {
            tokio::select! {
                _ = sleep_until(schedule.deadline().into()) => {
                    let now = schedule.advance();
                    reporter.tick(&self.metrics, now);
                }
                ready = self.socket.readable() => {
                    ready?;
                    self.drain();
                }
            }
        }
    }

    /// One read for the readiness event plus up to `poll` extra reads.
    fn drain(&mut self) {
        if !self.read_one() {
            return;
        }
        for _ in 0..self.poll {
            if !self.read_one() {
                break;
            }
        }
    }

    /// Returns false once the socket has nothing more to give.
    fn read_one(&mut self) -> bool {
        let slot = self.scratch.slot();
        match self.socket.try_recv_from(slot) {
            Ok((n, _)) => {
                self.record(n);
                true
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => false,
            Err(_) => {
                self.metrics.add_error();
                true
            }
        }
    }

    fn record(&mut self, received: usize) {
        self.metrics
            .add_packet(received, is_truncated(received, self.packet_size));
        self.scratch.advance(received);
    }
}

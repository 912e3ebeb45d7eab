use std::ffi::CString;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};

use libc::{c_int, c_void, poll, pollfd, socklen_t, EINTR, EIO, POLLERR, POLLIN, POLLNVAL};

use crate::error::{Error, Result};
use crate::ring::Wait;
use crate::tpacket::{tpacket_req3, PACKET_FANOUT, PACKET_RX_RING, PACKET_VERSION};

/// An `AF_PACKET` raw socket receiving every ethertype. Closed on drop.
#[derive(Debug)]
pub struct RawSocket {
    fd: RawFd,
}

impl RawSocket {
    pub fn new() -> Result<RawSocket> {
        let protocol = (libc::ETH_P_ALL as u16).to_be() as c_int;
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, protocol) };
        if fd < 0 {
            return Err(Error::last_os("socket"));
        }
        Ok(RawSocket { fd })
    }

    /// Restrict the socket to traffic arriving on `name`.
    pub fn bind_interface(&self, name: &str) -> Result<()> {
        let name_c = CString::new(name).map_err(|_| Error::InterfaceNotFound {
            name: name.to_string(),
        })?;
        let ifindex = unsafe { libc::if_nametoindex(name_c.as_ptr()) };
        if ifindex == 0 {
            return Err(Error::InterfaceNotFound {
                name: name.to_string(),
            });
        }

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        addr.sll_ifindex = ifindex as c_int;

        let ret = unsafe {
            libc::bind(
                self.fd,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as socklen_t,
            )
        };
        if ret != 0 {
            return Err(Error::last_os("bind"));
        }
        Ok(())
    }

    /// Join fan-out group `group_id` using distribution policy `mode`.
    pub fn join_fanout(&self, group_id: u16, mode: u32) -> Result<()> {
        self.set_packet_opt(PACKET_FANOUT, &fanout_arg(group_id, mode), "PACKET_FANOUT")
    }

    pub fn set_version(&self, version: c_int) -> Result<()> {
        self.set_packet_opt(PACKET_VERSION, &version, "PACKET_VERSION")
    }

    pub fn set_rx_ring(&self, req: &tpacket_req3) -> Result<()> {
        self.set_packet_opt(PACKET_RX_RING, req, "PACKET_RX_RING")
    }

    fn set_packet_opt<T>(&self, name: c_int, val: &T, op: &'static str) -> Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_PACKET,
                name,
                val as *const T as *const c_void,
                mem::size_of::<T>() as socklen_t,
            )
        };
        if ret != 0 {
            return Err(Error::last_os(op));
        }
        Ok(())
    }
}

/// `PACKET_FANOUT` takes the group id in the low 16 bits and the mode in the high 16 bits.
fn fanout_arg(group_id: u16, mode: u32) -> u32 {
    mode << 16 | u32::from(group_id)
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// The pending error on `fd` (`SO_ERROR`), or `EIO` if none can be read.
fn socket_error(fd: RawFd) -> std::io::Error {
    let mut err: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut err as *mut c_int as *mut c_void,
            &mut len,
        )
    };
    if ret != 0 || err == 0 {
        return std::io::Error::from_raw_os_error(EIO);
    }
    std::io::Error::from_raw_os_error(err)
}

/// Sleeps in `poll(2)` until the ring socket signals a retired block.
#[derive(Debug)]
pub struct FdPoller {
    fd: RawFd,
    cpu: usize,
}

impl FdPoller {
    pub fn new(fd: RawFd, cpu: usize) -> FdPoller {
        FdPoller { fd, cpu }
    }
}

impl Wait for FdPoller {
    fn wait(&mut self) -> Result<()> {
        let mut fds = [pollfd {
            fd: self.fd,
            events: POLLIN | POLLERR,
            revents: 0,
        }];

        let ret = unsafe { poll(fds.as_mut_ptr(), 1, -1) };
        if ret < 0 {
            let err = std::io::Error::from_raw_os_error(errno::errno().0);
            if err.raw_os_error() == Some(EINTR) {
                // Spurious wake; the caller re-checks the block flag.
                return Ok(());
            }
            return Err(Error::PollFailed {
                cpu: self.cpu,
                source: err,
            });
        }

        // An error or invalid descriptor condition stays set, so polling again would spin.
        let revents = fds[0].revents;
        if revents & POLLNVAL != 0 {
            return Err(Error::PollFailed {
                cpu: self.cpu,
                source: std::io::Error::from_raw_os_error(libc::EBADF),
            });
        }
        if revents & POLLERR != 0 {
            return Err(Error::PollFailed {
                cpu: self.cpu,
                source: socket_error(self.fd),
            });
        }
        Ok(())
    }
}

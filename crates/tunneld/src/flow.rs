//! OS packet flow: the conduit for raw IP packets on the tunnel interface.
//!
//! [`PacketFlow`] is the seam between the pump and the OS. The production
//! implementation is a Linux TUN device; tests substitute scripted flows.

use async_trait::async_trait;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use tokio::io::unix::AsyncFd;

use crate::types::{AddressFamily, READ_BATCH_MAX};

/// Largest IP packet the flow will hand out
const MAX_PACKET_SIZE: usize = 65536;

// TUNSETIFF = _IOW('T', 202, c_int); PowerPC encodes the write direction
// bit differently from x86/ARM.
#[cfg(any(target_arch = "powerpc", target_arch = "powerpc64"))]
const TUNSETIFF: libc::c_ulong = 0x800454ca;
#[cfg(not(any(target_arch = "powerpc", target_arch = "powerpc64")))]
const TUNSETIFF: libc::c_ulong = 0x400454ca;
const IFF_TUN: libc::c_short = 0x0001;
const IFF_NO_PI: libc::c_short = 0x1000;

/// The OS-provided packet conduit.
///
/// `read_packets` is the only suspending operation on the read side; it
/// parks the caller until at least one packet is available. Writes are
/// non-suspending. Implementations must tolerate concurrent reads and
/// writes from independent tasks.
#[async_trait]
pub trait PacketFlow: Send + Sync {
    /// Waits for and returns the next batch of packets (at least one).
    async fn read_packets(&self) -> io::Result<Vec<Vec<u8>>>;

    /// Writes a single packet tagged with its address family.
    fn write_packet(&self, packet: &[u8], family: AddressFamily) -> io::Result<()>;
}

#[repr(C)]
struct IfReq {
    name: [u8; libc::IFNAMSIZ],
    flags: libc::c_short,
    _pad: [u8; 22],
}

/// Raw TUN file descriptor. Closed on drop.
struct TunFd(RawFd);

impl AsRawFd for TunFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Drop for TunFd {
    fn drop(&mut self) {
        unsafe { libc::close(self.0) };
    }
}

/// Packet flow backed by a Linux TUN device.
///
/// Opened with `IFF_NO_PI`, so frames carry no protocol-info header and
/// the kernel derives the protocol of written packets from the IP version
/// nibble; the family tag is accepted for hosts that need explicit
/// tagging and ignored here.
pub struct TunPacketFlow {
    fd: AsyncFd<TunFd>,
    name: String,
}

impl TunPacketFlow {
    /// Opens `/dev/net/tun` and creates an interface with the given name.
    pub fn create(name: &str) -> io::Result<Self> {
        let fd = unsafe { libc::open(b"/dev/net/tun\0".as_ptr() as *const _, libc::O_RDWR) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut req = IfReq {
            name: [0u8; libc::IFNAMSIZ],
            flags: IFF_TUN | IFF_NO_PI,
            _pad: [0u8; 22],
        };
        let bytes = name.as_bytes();
        let copy_len = bytes.len().min(libc::IFNAMSIZ - 1);
        req.name[..copy_len].copy_from_slice(&bytes[..copy_len]);

        let ret = unsafe { libc::ioctl(fd, TUNSETIFF as _, &mut req as *mut _) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        // AsyncFd requires a non-blocking descriptor
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let actual = std::str::from_utf8(&req.name)
            .unwrap_or(name)
            .trim_end_matches('\0')
            .to_string();

        Ok(Self {
            fd: AsyncFd::new(TunFd(fd))?,
            name: actual,
        })
    }

    /// The interface name the kernel assigned.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_once(fd: RawFd) -> io::Result<Vec<u8>> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(buf[..n as usize].to_vec())
    }
}

#[async_trait]
impl PacketFlow for TunPacketFlow {
    async fn read_packets(&self) -> io::Result<Vec<Vec<u8>>> {
        let mut packets = Vec::new();

        // Park until the first packet arrives
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| Self::read_once(inner.get_ref().as_raw_fd())) {
                Ok(Ok(packet)) => {
                    packets.push(packet);
                    break;
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }

        // Drain whatever else is already queued, without suspending
        while packets.len() < READ_BATCH_MAX {
            match Self::read_once(self.fd.get_ref().as_raw_fd()) {
                Ok(packet) => packets.push(packet),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }

        Ok(packets)
    }

    fn write_packet(&self, packet: &[u8], _family: AddressFamily) -> io::Result<()> {
        let fd = self.fd.get_ref().as_raw_fd();
        let n = unsafe { libc::write(fd, packet.as_ptr() as *const _, packet.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

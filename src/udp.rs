//! Datagram transport.
//!
//! The rest of the crate treats this as an opaque collaborator: send a
//! fixed-size buffer to an address, receive one with an optional timeout,
//! and report timeout distinctly from data arrival. The socket closes on
//! drop.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a socket on `port`; 0 picks an ephemeral port.
    pub fn open(port: u16) -> io::Result<UdpTransport> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        Ok(UdpTransport { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn send(&self, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
        self.socket.send_to(buf, addr)?;
        Ok(())
    }

    /// Receive one datagram. `Ok(None)` is a timeout, not an error;
    /// `timeout: None` blocks until data arrives.
    pub fn recv(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        self.socket.set_read_timeout(timeout)?;
        match self.socket.recv_from(buf) {
            Ok((len, addr)) => Ok(Some((len, addr))),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_reported_as_no_data() {
        let transport = UdpTransport::open(0).unwrap();
        let mut buf = [0u8; 16];
        let got = transport
            .recv(&mut buf, Some(Duration::from_millis(30)))
            .unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn datagrams_travel_between_sockets() {
        let a = UdpTransport::open(0).unwrap();
        let b = UdpTransport::open(0).unwrap();
        let b_addr = SocketAddr::from(([127, 0, 0, 1], b.local_addr().unwrap().port()));
        a.send(b"ping", b_addr).unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = b
            .recv(&mut buf, Some(Duration::from_secs(2)))
            .unwrap()
            .expect("datagram should arrive");
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from.port(), a.local_addr().unwrap().port());
    }
}

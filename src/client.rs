//! Client library.
//!
//! Each call builds one request, sends it, and waits a fixed timeout for
//! the response; on timeout the identical bytes are resent, without bound,
//! until the server answers. Mutations are therefore at-least-once: WRITE
//! and UNLINK are idempotent by value, and the server suppresses duplicate
//! CREATEs, so retries are safe end to end.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use log::warn;

use crate::dir;
use crate::disk::FileKind;
use crate::fs::Stat;
use crate::udp::UdpTransport;
use crate::wire::{OpKind, Request, Response, RESPONSE_SIZE};
use crate::BSIZE;

/// default per-attempt response timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub enum ClientError {
    /// The server answered with a failure code; the message is its text.
    Server(String),
    /// Local socket failure.
    Io(io::Error),
    /// Name refused before it ever reached the wire.
    InvalidName,
    /// Host/port did not resolve to an address.
    BadAddress,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Server(msg) => write!(f, "server: {msg}"),
            ClientError::Io(err) => write!(f, "io: {err}"),
            ClientError::InvalidName => write!(f, "invalid name"),
            ClientError::BadAddress => write!(f, "bad server address"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Io(err)
    }
}

pub struct MfsClient {
    transport: UdpTransport,
    server: SocketAddr,
    timeout: Duration,
}

impl MfsClient {
    /// Bind an ephemeral socket and remember the server address.
    pub fn init(host: &str, port: u16) -> Result<MfsClient, ClientError> {
        let server = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or(ClientError::BadAddress)?;
        Ok(MfsClient {
            transport: UdpTransport::open(0)?,
            server,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the per-attempt timeout (tests use short ones).
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Inode number bound to `name` under the directory `pinum`.
    pub fn lookup(&self, pinum: u32, name: &str) -> Result<u32, ClientError> {
        let mut req = Request::new(OpKind::Lookup);
        req.pinum = pinum as i32;
        req.set_name(checked_name(name)?);
        let resp = self.call(&req)?;
        Ok(resp.inum as u32)
    }

    /// File kind and size of `inum`.
    pub fn stat(&self, inum: u32) -> Result<Stat, ClientError> {
        let mut req = Request::new(OpKind::Stat);
        req.inum = inum as i32;
        let resp = self.call(&req)?;
        let kind = FileKind::from_wire(resp.kind)
            .ok_or_else(|| ClientError::Server("unknown file kind in reply".into()))?;
        Ok(Stat {
            kind,
            size: resp.size,
        })
    }

    /// Write one full block of `inum` at index `block`.
    pub fn write(&self, inum: u32, block: usize, data: &[u8; BSIZE]) -> Result<(), ClientError> {
        let mut req = Request::new(OpKind::Write);
        req.inum = inum as i32;
        req.block = block as i32;
        req.payload = *data;
        self.call(&req)?;
        Ok(())
    }

    /// Read one full block of `inum` at index `block`.
    pub fn read(&self, inum: u32, block: usize) -> Result<[u8; BSIZE], ClientError> {
        let mut req = Request::new(OpKind::Read);
        req.inum = inum as i32;
        req.block = block as i32;
        let resp = self.call(&req)?;
        Ok(resp.payload)
    }

    /// Create `name` under the directory `pinum`; returns the inode number
    /// (the existing one, if a retried create already succeeded).
    pub fn create(&self, pinum: u32, kind: FileKind, name: &str) -> Result<u32, ClientError> {
        let mut req = Request::new(OpKind::Create);
        req.pinum = pinum as i32;
        req.kind = kind.wire();
        req.set_name(checked_name(name)?);
        let resp = self.call(&req)?;
        Ok(resp.inum as u32)
    }

    /// Remove `name` from the directory `pinum`. A name that does not
    /// exist is a successful no-op.
    pub fn unlink(&self, pinum: u32, name: &str) -> Result<(), ClientError> {
        let mut req = Request::new(OpKind::Unlink);
        req.pinum = pinum as i32;
        req.set_name(checked_name(name)?);
        self.call(&req)?;
        Ok(())
    }

    /// Flush the image and stop the server.
    pub fn shutdown(&self) -> Result<(), ClientError> {
        self.call(&Request::new(OpKind::Shutdown))?;
        Ok(())
    }

    /// Send `req` and wait for the response, resending the identical bytes
    /// after every timeout until the server answers.
    fn call(&self, req: &Request) -> Result<Response, ClientError> {
        let bytes = req.encode();
        let mut buf = [0u8; RESPONSE_SIZE];
        loop {
            self.transport.send(&bytes, self.server)?;
            match self.transport.recv(&mut buf, Some(self.timeout))? {
                Some((len, _)) => {
                    let resp = Response::decode(&buf[..len])
                        .map_err(|_| ClientError::Server("undecodable response".into()))?;
                    if resp.retval < 0 {
                        return Err(ClientError::Server(resp.msg().to_string()));
                    }
                    return Ok(resp);
                }
                None => warn!("request timed out, trying again"),
            }
        }
    }
}

fn checked_name(name: &str) -> Result<&str, ClientError> {
    if dir::valid_name(name) {
        Ok(name)
    } else {
        Err(ClientError::InvalidName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DIRSIZ;

    #[test]
    fn bad_names_never_reach_the_wire() {
        let client = MfsClient::init("127.0.0.1", 1).unwrap();
        assert!(matches!(
            client.lookup(0, "").unwrap_err(),
            ClientError::InvalidName
        ));
        assert!(matches!(
            client.create(0, FileKind::Regular, &"n".repeat(DIRSIZ)).unwrap_err(),
            ClientError::InvalidName
        ));
        assert!(matches!(
            client.unlink(0, "has\0nul").unwrap_err(),
            ClientError::InvalidName
        ));
    }
}

//! The request loop: receive, decode, dispatch, reply, repeat.
//!
//! Single-threaded on purpose: one request is in flight at a time, so the
//! store needs no locking. A failed request is answered and forgotten;
//! only SHUTDOWN (after its reply) ends the loop.

use std::io;

use log::{debug, info, warn};

use crate::disk::FileKind;
use crate::error::FsError;
use crate::fs::MfsStore;
use crate::udp::UdpTransport;
use crate::wire::{OpKind, Request, Response, REQUEST_SIZE};

pub struct Server {
    store: MfsStore,
    transport: UdpTransport,
}

impl Server {
    pub fn new(store: MfsStore, transport: UdpTransport) -> Server {
        Server { store, transport }
    }

    /// Serve until a SHUTDOWN request has been answered. The image is
    /// flushed before the shutdown reply goes out.
    pub fn run(&mut self) -> io::Result<()> {
        info!("serving on {}", self.transport.local_addr()?);
        let mut buf = [0u8; REQUEST_SIZE];
        loop {
            let Some((len, peer)) = self.transport.recv(&mut buf, None)? else {
                continue;
            };
            let (resp, shutdown) = match Request::decode(&buf[..len]) {
                Ok(req) => {
                    debug!("{:?} from {peer}", req.op);
                    (self.dispatch(&req), req.op == OpKind::Shutdown)
                }
                Err(err) => {
                    warn!("undecodable datagram ({len} bytes) from {peer}");
                    (Response::failure(&err), false)
                }
            };
            self.transport.send(&resp.encode(), peer)?;
            if shutdown {
                info!("shutdown requested, image closed");
                return Ok(());
            }
        }
    }

    /// Translate one request into one response. Failures become a negative
    /// result code plus a short message; nothing here panics on bad input.
    pub fn dispatch(&mut self, req: &Request) -> Response {
        match self.handle(req) {
            Ok(resp) => resp,
            Err(err) => {
                warn!("{:?} failed: {err}", req.op);
                Response::failure(&err)
            }
        }
    }

    fn handle(&mut self, req: &Request) -> Result<Response, FsError> {
        match req.op {
            OpKind::Lookup => {
                let name = req.name().ok_or(FsError::BadRequest)?;
                let inum = self.store.lookup(inum_arg(req.pinum)?, name)?;
                Ok(Response::ok_inum(inum))
            }
            OpKind::Stat => {
                let st = self.store.stat(inum_arg(req.inum)?)?;
                Ok(Response::ok_stat(st.kind.wire(), st.size))
            }
            OpKind::Write => {
                let block = block_arg(req.block)?;
                self.store
                    .write(inum_arg(req.inum)?, block, &req.payload)?;
                self.store.sync();
                Ok(Response::ok())
            }
            OpKind::Read => {
                let block = block_arg(req.block)?;
                let payload = self.store.read(inum_arg(req.inum)?, block)?;
                Ok(Response::ok_payload(&payload))
            }
            OpKind::Create => {
                let pinum = inum_arg(req.pinum)?;
                let kind = FileKind::from_wire(req.kind).ok_or(FsError::BadRequest)?;
                let name = req.name().ok_or(FsError::BadRequest)?;
                // a retried CREATE whose first reply was lost must not make
                // a second entry: answer with the existing binding instead
                if let Ok(inum) = self.store.lookup(pinum, name) {
                    debug!("create {name:?} already bound to inum {inum}");
                    return Ok(Response::ok_inum(inum));
                }
                let inum = self.store.create(pinum, kind, name)?;
                self.store.sync();
                Ok(Response::ok_inum(inum))
            }
            OpKind::Unlink => {
                let name = req.name().ok_or(FsError::BadRequest)?;
                self.store.unlink(inum_arg(req.pinum)?, name)?;
                self.store.sync();
                Ok(Response::ok())
            }
            OpKind::Shutdown => {
                self.store.flush();
                Ok(Response::ok())
            }
        }
    }
}

fn inum_arg(v: i32) -> Result<u32, FsError> {
    u32::try_from(v).map_err(|_| FsError::InvalidInode)
}

fn block_arg(v: i32) -> Result<usize, FsError> {
    usize::try_from(v).map_err(|_| FsError::InvalidBlock)
}

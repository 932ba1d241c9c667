//! Fixed-size request/response records exchanged as whole datagrams.
//!
//! Every request and every response has the same byte length regardless of
//! operation, so the protocol stays stateless and framing-free. Fields sit
//! at fixed offsets with explicit little-endian byte order; peers built
//! independently agree on the layout without sharing a memory model.

use crate::error::FsError;
use crate::BSIZE;

/// bytes in the request name field
pub const NAMESZ: usize = 64;

/// bytes in the response status message field
pub const MSGSZ: usize = 32;

/// encoded request: five i32 fields, name, payload
pub const REQUEST_SIZE: usize = 20 + NAMESZ + BSIZE;

/// encoded response: four i32 fields, message, payload
pub const RESPONSE_SIZE: usize = 16 + MSGSZ + BSIZE;

/// Operation selector. The discriminants are the wire values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Lookup = 101,
    Stat = 102,
    Write = 103,
    Read = 104,
    Create = 105,
    Unlink = 106,
    Shutdown = 107,
}

impl OpKind {
    pub fn from_wire(v: i32) -> Option<OpKind> {
        match v {
            101 => Some(OpKind::Lookup),
            102 => Some(OpKind::Stat),
            103 => Some(OpKind::Write),
            104 => Some(OpKind::Read),
            105 => Some(OpKind::Create),
            106 => Some(OpKind::Unlink),
            107 => Some(OpKind::Shutdown),
            _ => None,
        }
    }
}

fn read_i32(buf: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// One client request. The same record shape is sent for every operation;
/// fields an operation does not use stay zero.
#[derive(Clone)]
pub struct Request {
    pub op: OpKind,
    /// creation file kind, as a raw wire value
    pub kind: i32,
    pub inum: i32,
    pub pinum: i32,
    pub block: i32,
    pub name: [u8; NAMESZ],
    pub payload: [u8; BSIZE],
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("op", &self.op)
            .field("kind", &self.kind)
            .field("inum", &self.inum)
            .field("pinum", &self.pinum)
            .field("block", &self.block)
            .finish_non_exhaustive()
    }
}

impl Request {
    pub fn new(op: OpKind) -> Request {
        Request {
            op,
            kind: 0,
            inum: 0,
            pinum: 0,
            block: 0,
            name: [0; NAMESZ],
            payload: [0; BSIZE],
        }
    }

    /// NUL-pad `name` into the name field. The caller has validated the
    /// length against the directory-entry limit.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; NAMESZ];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }

    /// The name field up to its first NUL, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAMESZ);
        std::str::from_utf8(&self.name[..end]).ok()
    }

    pub fn encode(&self) -> [u8; REQUEST_SIZE] {
        let mut buf = [0u8; REQUEST_SIZE];
        buf[0..4].copy_from_slice(&(self.op as i32).to_le_bytes());
        buf[4..8].copy_from_slice(&self.kind.to_le_bytes());
        buf[8..12].copy_from_slice(&self.inum.to_le_bytes());
        buf[12..16].copy_from_slice(&self.pinum.to_le_bytes());
        buf[16..20].copy_from_slice(&self.block.to_le_bytes());
        buf[20..20 + NAMESZ].copy_from_slice(&self.name);
        buf[20 + NAMESZ..].copy_from_slice(&self.payload);
        buf
    }

    /// Decode one datagram. Short buffers and unknown operations are
    /// protocol errors, never panics.
    pub fn decode(buf: &[u8]) -> Result<Request, FsError> {
        if buf.len() < REQUEST_SIZE {
            return Err(FsError::BadRequest);
        }
        let op = OpKind::from_wire(read_i32(buf, 0)).ok_or(FsError::BadRequest)?;
        let mut req = Request::new(op);
        req.kind = read_i32(buf, 4);
        req.inum = read_i32(buf, 8);
        req.pinum = read_i32(buf, 12);
        req.block = read_i32(buf, 16);
        req.name.copy_from_slice(&buf[20..20 + NAMESZ]);
        req.payload.copy_from_slice(&buf[20 + NAMESZ..REQUEST_SIZE]);
        Ok(req)
    }
}

/// One server response. A negative `retval` carries a failure; `msg` holds
/// the short status text either way.
#[derive(Clone)]
pub struct Response {
    pub retval: i32,
    pub inum: i32,
    /// stat record: file kind as a raw wire value
    pub kind: i32,
    /// stat record: file size in bytes
    pub size: u32,
    pub msg: [u8; MSGSZ],
    pub payload: [u8; BSIZE],
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("retval", &self.retval)
            .field("inum", &self.inum)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Response {
    pub fn ok() -> Response {
        Response {
            retval: 0,
            inum: 0,
            kind: 0,
            size: 0,
            msg: [0; MSGSZ],
            payload: [0; BSIZE],
        }
    }

    pub fn ok_inum(inum: u32) -> Response {
        let mut resp = Response::ok();
        resp.inum = inum as i32;
        resp
    }

    pub fn ok_stat(kind: i32, size: u32) -> Response {
        let mut resp = Response::ok();
        resp.kind = kind;
        resp.size = size;
        resp
    }

    pub fn ok_payload(payload: &[u8; BSIZE]) -> Response {
        let mut resp = Response::ok();
        resp.payload = *payload;
        resp
    }

    pub fn failure(err: &FsError) -> Response {
        let mut resp = Response::ok();
        resp.retval = -1;
        let text = err.to_string();
        let len = text.len().min(MSGSZ - 1);
        resp.msg[..len].copy_from_slice(&text.as_bytes()[..len]);
        resp
    }

    /// The status message up to its first NUL.
    pub fn msg(&self) -> &str {
        let end = self.msg.iter().position(|&b| b == 0).unwrap_or(MSGSZ);
        std::str::from_utf8(&self.msg[..end]).unwrap_or("")
    }

    pub fn encode(&self) -> [u8; RESPONSE_SIZE] {
        let mut buf = [0u8; RESPONSE_SIZE];
        buf[0..4].copy_from_slice(&self.retval.to_le_bytes());
        buf[4..8].copy_from_slice(&self.inum.to_le_bytes());
        buf[8..12].copy_from_slice(&self.kind.to_le_bytes());
        buf[12..16].copy_from_slice(&self.size.to_le_bytes());
        buf[16..16 + MSGSZ].copy_from_slice(&self.msg);
        buf[16 + MSGSZ..].copy_from_slice(&self.payload);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Response, FsError> {
        if buf.len() < RESPONSE_SIZE {
            return Err(FsError::BadRequest);
        }
        let mut resp = Response::ok();
        resp.retval = read_i32(buf, 0);
        resp.inum = read_i32(buf, 4);
        resp.kind = read_i32(buf, 8);
        resp.size = read_i32(buf, 12) as u32;
        resp.msg.copy_from_slice(&buf[16..16 + MSGSZ]);
        resp.payload.copy_from_slice(&buf[16 + MSGSZ..RESPONSE_SIZE]);
        Ok(resp)
    }
}

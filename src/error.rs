//! Failure taxonomy for the store and the request dispatcher.
//!
//! Every variant becomes a negative result code plus the short message
//! carried in the response record. None of them is fatal to the server;
//! each request is answered and the loop keeps going.

use std::fmt;
use std::io;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FsError {
    /// Inode number outside `0..ninodes`
    InvalidInode,
    /// Block index outside the direct-address range
    InvalidBlock,
    /// Directory operation addressed through a non-directory inode
    NotADirectory,
    /// Write addressed a directory
    IsADirectory,
    /// Operation on an inode that is not in use
    UnusedInode,
    /// Name not present in the directory
    NotFound,
    /// Read of an address slot that was never assigned a block
    BlockNotAllocated,
    /// Data region exhausted
    NoFreeBlocks,
    /// Inode table exhausted
    NoFreeInodes,
    /// Every entry slot in every address slot of the directory is taken
    DirectoryFull,
    /// Unlink of a directory that still holds live entries
    DirectoryNotEmpty,
    /// Empty, over-long, or NUL-carrying name
    InvalidName,
    /// Unrecognized operation or undecodable datagram
    BadRequest,
    /// Image metadata does not match this layout
    BadImage(String),
    /// Underlying storage failure
    Io(String),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::InvalidInode => write!(f, "invalid inode"),
            FsError::InvalidBlock => write!(f, "invalid block"),
            FsError::NotADirectory => write!(f, "not a directory"),
            FsError::IsADirectory => write!(f, "cannot write to a directory"),
            FsError::UnusedInode => write!(f, "inode is unused"),
            FsError::NotFound => write!(f, "name not found"),
            FsError::BlockNotAllocated => write!(f, "block not allocated"),
            FsError::NoFreeBlocks => write!(f, "no data blocks available"),
            FsError::NoFreeInodes => write!(f, "no inodes are available"),
            FsError::DirectoryFull => write!(f, "directory is full"),
            FsError::DirectoryNotEmpty => write!(f, "directory is non-empty"),
            FsError::InvalidName => write!(f, "invalid name"),
            FsError::BadRequest => write!(f, "bad request"),
            FsError::BadImage(why) => write!(f, "bad image: {why}"),
            FsError::Io(why) => write!(f, "io error: {why}"),
        }
    }
}

impl std::error::Error for FsError {}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        FsError::Io(err.to_string())
    }
}

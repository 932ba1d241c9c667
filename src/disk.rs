//! On-disk records.
//!
//! The superblock and the inode records are serialized with bincode's
//! fixed-width little-endian encoding, so their byte layout is canonical:
//! 12 bytes for the superblock, 64 bytes per inode. Directory entries carry
//! a 60-byte name field and are packed by hand in [`crate::dir`].

use serde::{Deserialize, Serialize};

use crate::error::FsError;
use crate::{BSIZE, DIRSIZ, NDIRECT};

/// sentinel address: slot holds no block
pub const NO_BLOCK: u32 = u32::MAX;

/// serialized size of one inode record
pub const INODE_SIZE: usize = 64;

/// inodes per table block
pub const IPB: usize = BSIZE / INODE_SIZE;

/// serialized size of the superblock record
pub const SUPERBLOCK_SIZE: usize = 12;

/// serialized size of one directory entry
pub const DIRENT_SIZE: usize = DIRSIZ + 4;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SuperBlock {
    /// Size of file system image (blocks)
    pub size: u32,
    /// Number of data blocks
    pub nblocks: u32,
    /// Number of inodes.
    pub ninodes: u32,
}

impl SuperBlock {
    /// Decode from the front of the superblock block.
    pub fn decode(block: &[u8]) -> Result<Self, FsError> {
        bincode::deserialize(&block[..SUPERBLOCK_SIZE])
            .map_err(|_| FsError::BadImage("unreadable superblock".into()))
    }

    pub fn encode_into(&self, block: &mut [u8]) {
        bincode::serialize_into(&mut block[..SUPERBLOCK_SIZE], self)
            .expect("superblock record fits its slot");
    }
}

/// File type stored in an inode. The serialized variant tags are the
/// on-disk (and wire) values: 0 unused, 1 regular, 2 directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Unused,
    Regular,
    Directory,
}

impl Default for FileKind {
    fn default() -> Self {
        FileKind::Unused
    }
}

impl FileKind {
    pub fn from_wire(v: i32) -> Option<FileKind> {
        match v {
            0 => Some(FileKind::Unused),
            1 => Some(FileKind::Regular),
            2 => Some(FileKind::Directory),
            _ => None,
        }
    }

    pub fn wire(self) -> i32 {
        match self {
            FileKind::Unused => 0,
            FileKind::Regular => 1,
            FileKind::Directory => 2,
        }
    }
}

/// inode on disk
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DInode {
    /// File type
    pub kind: FileKind,
    /// Size of file (bytes)
    pub size: u32,
    /// Data block addresses; `NO_BLOCK` marks an unassigned slot
    addrs: [u32; NDIRECT + 1],
}

impl Default for DInode {
    fn default() -> Self {
        DInode {
            kind: FileKind::Unused,
            size: 0,
            addrs: [NO_BLOCK; NDIRECT + 1],
        }
    }
}

impl DInode {
    /// Block number held in `slot`, if one has been assigned.
    pub fn addr(&self, slot: usize) -> Option<u32> {
        match self.addrs[slot] {
            NO_BLOCK => None,
            bno => Some(bno),
        }
    }

    pub fn set_addr(&mut self, slot: usize, addr: Option<u32>) {
        self.addrs[slot] = addr.unwrap_or(NO_BLOCK);
    }

    /// Address slots in order; `None` entries were never assigned.
    pub fn addrs(&self) -> impl Iterator<Item = Option<u32>> + '_ {
        (0..self.addrs.len()).map(|slot| self.addr(slot))
    }

    /// First slot with no address, if any.
    pub fn first_free_slot(&self) -> Option<usize> {
        (0..self.addrs.len()).find(|&slot| self.addr(slot).is_none())
    }

    /// Reset to the unused state: zero size, every slot cleared.
    pub fn clear(&mut self) {
        *self = DInode::default();
    }
}

/// Directory entry: a name bound to an inode number. `inum` is `None` for
/// an empty slot (serialized as -1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEnt {
    pub name: [u8; DIRSIZ],
    pub inum: Option<u32>,
}

impl DirEnt {
    /// An empty slot: zeroed name, no inode bound.
    pub fn empty() -> Self {
        DirEnt {
            name: [0; DIRSIZ],
            inum: None,
        }
    }

    /// Bind `name` to `inum`. The caller has validated the name length.
    pub fn new(name: &str, inum: u32) -> Self {
        let mut ent = DirEnt::empty();
        ent.name[..name.len()].copy_from_slice(name.as_bytes());
        ent.inum = Some(inum);
        ent
    }

    /// The name up to its first NUL.
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(DIRSIZ);
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_the_layout() {
        assert_eq!(
            bincode::serialized_size(&SuperBlock::default()).unwrap(),
            SUPERBLOCK_SIZE as u64
        );
        assert_eq!(
            bincode::serialized_size(&DInode::default()).unwrap(),
            INODE_SIZE as u64
        );
    }

    #[test]
    fn file_kind_tags_are_the_wire_values() {
        assert_eq!(bincode::serialize(&FileKind::Unused).unwrap(), [0, 0, 0, 0]);
        assert_eq!(bincode::serialize(&FileKind::Regular).unwrap(), [1, 0, 0, 0]);
        assert_eq!(
            bincode::serialize(&FileKind::Directory).unwrap(),
            [2, 0, 0, 0]
        );
        assert_eq!(FileKind::from_wire(2), Some(FileKind::Directory));
        assert_eq!(FileKind::from_wire(7), None);
        assert_eq!(FileKind::Regular.wire(), 1);
    }

    #[test]
    fn unused_inode_has_no_addresses() {
        let dinode = DInode::default();
        assert_eq!(dinode.kind, FileKind::Unused);
        assert_eq!(dinode.size, 0);
        assert!(dinode.addrs().all(|a| a.is_none()));
        assert_eq!(dinode.first_free_slot(), Some(0));
    }

    #[test]
    fn address_slots_round_trip_through_the_sentinel() {
        let mut dinode = DInode::default();
        dinode.set_addr(0, Some(4));
        dinode.set_addr(NDIRECT, Some(9));
        assert_eq!(dinode.addr(0), Some(4));
        assert_eq!(dinode.addr(1), None);
        assert_eq!(dinode.addr(NDIRECT), Some(9));
        assert_eq!(dinode.first_free_slot(), Some(1));

        let bytes = bincode::serialize(&dinode).unwrap();
        let back: DInode = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, dinode);
    }

    #[test]
    fn dirent_name_stops_at_the_nul() {
        let ent = DirEnt::new("notes.txt", 7);
        assert_eq!(ent.name_str(), "notes.txt");
        assert_eq!(ent.inum, Some(7));
        assert_eq!(DirEnt::empty().name_str(), "");
    }
}

//! Directory blocks.
//!
//! A directory's data block is a fixed array of entry slots: a 60-byte
//! NUL-padded name followed by a little-endian i32 inode number, -1 for an
//! empty slot. The first block of a freshly created directory carries `.`
//! and `..` in its first two slots; blocks appended purely for growth hold
//! only empty slots.

use crate::disk::{DirEnt, DIRENT_SIZE};
use crate::{BSIZE, DIRSIZ};

/// entry slots per directory block
pub const DENTS_PER_BLOCK: usize = BSIZE / DIRENT_SIZE;

/// on-disk inode number of an empty slot
const EMPTY_SLOT: i32 = -1;

/// A name fits a directory entry: non-empty, room for the trailing NUL,
/// no interior NUL bytes.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() < DIRSIZ && !name.bytes().any(|b| b == 0)
}

/// Decode slot `slot` of a directory block.
pub fn entry_at(block: &[u8], slot: usize) -> DirEnt {
    let off = slot * DIRENT_SIZE;
    let mut name = [0u8; DIRSIZ];
    name.copy_from_slice(&block[off..off + DIRSIZ]);
    let raw = i32::from_le_bytes([
        block[off + DIRSIZ],
        block[off + DIRSIZ + 1],
        block[off + DIRSIZ + 2],
        block[off + DIRSIZ + 3],
    ]);
    let inum = if raw == EMPTY_SLOT {
        None
    } else {
        Some(raw as u32)
    };
    DirEnt { name, inum }
}

/// Encode `ent` into slot `slot`.
pub fn set_entry(block: &mut [u8], slot: usize, ent: &DirEnt) {
    let off = slot * DIRENT_SIZE;
    block[off..off + DIRSIZ].copy_from_slice(&ent.name);
    let raw = match ent.inum {
        Some(inum) => inum as i32,
        None => EMPTY_SLOT,
    };
    block[off + DIRSIZ..off + DIRENT_SIZE].copy_from_slice(&raw.to_le_bytes());
}

/// Slot and inode number of the entry named `name`, skipping empty slots.
pub fn find_name(block: &[u8], name: &str) -> Option<(usize, u32)> {
    (0..DENTS_PER_BLOCK).find_map(|slot| {
        let ent = entry_at(block, slot);
        match ent.inum {
            Some(inum) if ent.name_str() == name => Some((slot, inum)),
            _ => None,
        }
    })
}

/// First slot with no inode bound to it.
pub fn find_free_slot(block: &[u8]) -> Option<usize> {
    (0..DENTS_PER_BLOCK).find(|&slot| entry_at(block, slot).inum.is_none())
}

/// First block of a new directory: `.` and `..`, then empty slots.
pub fn fresh_dir_block(pinum: u32, inum: u32) -> [u8; BSIZE] {
    let mut block = empty_dir_block();
    set_entry(&mut block, 0, &DirEnt::new(".", inum));
    set_entry(&mut block, 1, &DirEnt::new("..", pinum));
    block
}

/// Block appended to a directory purely for growth: every slot empty.
pub fn empty_dir_block() -> [u8; BSIZE] {
    let mut block = [0u8; BSIZE];
    for slot in 0..DENTS_PER_BLOCK {
        set_entry(&mut block, slot, &DirEnt::empty());
    }
    block
}

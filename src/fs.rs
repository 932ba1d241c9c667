//! The file-system store: the backing device plus the in-memory mirror of
//! the metadata region (superblock, inode table, data bitmap).
//!
//! Every mutating operation rewrites the metadata blocks before touching
//! the data region; the caller decides when the device is synced (the
//! server does it before acknowledging a mutation).

use std::sync::Arc;

use log::{debug, info};

use crate::bitmap::BitMap;
use crate::block_device::BlockDevice;
use crate::dir;
use crate::disk::{DInode, DirEnt, FileKind, SuperBlock, IPB};
use crate::error::FsError;
use crate::inode::InodeTable;
use crate::{
    BITMAP_BLOCKNO, BSIZE, DATA_START, FSSIZE, INODE_BLOCKNO, NBLOCKS, NDIRECT, ROOTINO,
    SUPER_BLOCKNO,
};

/// File kind and size, as reported to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stat {
    pub kind: FileKind,
    pub size: u32,
}

pub struct MfsStore {
    dev: Arc<dyn BlockDevice>,
    sb: SuperBlock,
    inodes: InodeTable,
    bitmap: BitMap,
}

impl std::fmt::Debug for MfsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfsStore")
            .field("sb", &self.sb)
            .finish_non_exhaustive()
    }
}

impl MfsStore {
    /// Format a fresh image: empty metadata plus the root directory at
    /// inode 0, whose `.` and `..` both point back at itself.
    pub fn format(dev: Arc<dyn BlockDevice>) -> MfsStore {
        let sb = SuperBlock {
            size: FSSIZE as u32,
            nblocks: NBLOCKS as u32,
            ninodes: IPB as u32,
        };
        let mut store = MfsStore {
            dev,
            sb,
            inodes: InodeTable::new(IPB),
            bitmap: BitMap::new(NBLOCKS),
        };

        let bno = DATA_START as u32;
        store.bitmap.allocate(bno);
        store.inodes.alloc(ROOTINO, FileKind::Directory);
        store
            .inodes
            .get_mut(ROOTINO)
            .expect("root inode is in range")
            .set_addr(0, Some(bno));
        store.write_block(bno, &dir::fresh_dir_block(ROOTINO, ROOTINO));
        store.flush();

        info!(
            "formatted image: {} blocks, {} inodes",
            store.sb.size, store.sb.ninodes
        );
        store
    }

    /// Load the metadata region of an existing image.
    pub fn open(dev: Arc<dyn BlockDevice>) -> Result<MfsStore, FsError> {
        let mut block = [0u8; BSIZE];
        dev.read_block(SUPER_BLOCKNO, &mut block);
        let sb = SuperBlock::decode(&block)?;
        if sb.nblocks as usize != NBLOCKS
            || sb.ninodes as usize > IPB
            || sb.size != sb.nblocks + DATA_START as u32
        {
            return Err(FsError::BadImage(format!(
                "unexpected geometry: {} blocks, {} data, {} inodes",
                sb.size, sb.nblocks, sb.ninodes
            )));
        }

        dev.read_block(INODE_BLOCKNO, &mut block);
        let inodes = InodeTable::decode(&block, sb.ninodes as usize)?;
        dev.read_block(BITMAP_BLOCKNO, &mut block);
        let bitmap = BitMap::decode(&block, sb.nblocks as usize);

        info!(
            "loaded image: {} blocks, {} inodes",
            sb.size, sb.ninodes
        );
        Ok(MfsStore {
            dev,
            sb,
            inodes,
            bitmap,
        })
    }

    /// Inode number bound to `name` under the directory `pinum`.
    pub fn lookup(&self, pinum: u32, name: &str) -> Result<u32, FsError> {
        let dinode = self.inodes.get(pinum)?;
        if dinode.kind != FileKind::Directory {
            return Err(FsError::NotADirectory);
        }
        let dinode = dinode.clone();
        self.lookup_entry(&dinode, name)
            .map(|(_, _, inum)| inum)
            .ok_or(FsError::NotFound)
    }

    pub fn stat(&self, inum: u32) -> Result<Stat, FsError> {
        let dinode = self.inodes.get(inum)?;
        if dinode.kind == FileKind::Unused {
            return Err(FsError::UnusedInode);
        }
        Ok(Stat {
            kind: dinode.kind,
            size: dinode.size,
        })
    }

    /// Write one full block at index `block`, assigning a data block to the
    /// slot on first use. Size becomes the highest written block boundary.
    pub fn write(&mut self, inum: u32, block: usize, data: &[u8; BSIZE]) -> Result<(), FsError> {
        if block > NDIRECT {
            return Err(FsError::InvalidBlock);
        }
        let dinode = self.inodes.get(inum)?;
        match dinode.kind {
            FileKind::Unused => return Err(FsError::UnusedInode),
            FileKind::Directory => return Err(FsError::IsADirectory),
            FileKind::Regular => {}
        }

        let bno = match dinode.addr(block) {
            Some(bno) => bno,
            None => {
                let bno = self.balloc()?;
                self.inodes
                    .get_mut(inum)
                    .expect("inode checked above")
                    .set_addr(block, Some(bno));
                bno
            }
        };
        let dinode = self.inodes.get_mut(inum).expect("inode checked above");
        dinode.size = dinode.size.max(((block + 1) * BSIZE) as u32);

        self.write_meta();
        self.write_block(bno, data);
        debug!("write inum {inum} block {block} -> bno {bno}");
        Ok(())
    }

    /// Raw contents of the block at index `block`.
    pub fn read(&self, inum: u32, block: usize) -> Result<[u8; BSIZE], FsError> {
        if block > NDIRECT {
            return Err(FsError::InvalidBlock);
        }
        let dinode = self.inodes.get(inum)?;
        if dinode.kind == FileKind::Unused {
            return Err(FsError::UnusedInode);
        }
        let bno = dinode.addr(block).ok_or(FsError::BlockNotAllocated)?;
        Ok(self.read_block(bno))
    }

    /// Create `name` under the directory `pinum`; returns the new inode
    /// number. The first data block is assigned up front and, for
    /// directories, initialized with `.` and `..`.
    pub fn create(&mut self, pinum: u32, kind: FileKind, name: &str) -> Result<u32, FsError> {
        if kind == FileKind::Unused {
            return Err(FsError::BadRequest);
        }
        if !dir::valid_name(name) {
            return Err(FsError::InvalidName);
        }
        let parent = self.inodes.get(pinum)?;
        if parent.kind != FileKind::Directory {
            return Err(FsError::NotADirectory);
        }

        let (dirbno, slot) = self.find_or_grow_slot(pinum)?;
        let inum = self.inodes.find_free().ok_or(FsError::NoFreeInodes)?;
        let bno = self.balloc()?;
        self.inodes.alloc(inum, kind);
        self.inodes
            .get_mut(inum)
            .expect("free inode is in range")
            .set_addr(0, Some(bno));
        self.write_meta();

        if kind == FileKind::Directory {
            self.write_block(bno, &dir::fresh_dir_block(pinum, inum));
        }
        let mut block = self.read_block(dirbno);
        dir::set_entry(&mut block, slot, &DirEnt::new(name, inum));
        self.write_block(dirbno, &block);
        debug!("create {name:?} under {pinum} -> inum {inum}");
        Ok(inum)
    }

    /// Remove `name` from the directory `pinum`, releasing the target's
    /// blocks and inode. A name that was never present is a successful
    /// no-op. A directory still holding entries besides `.` and `..`
    /// cannot be removed.
    pub fn unlink(&mut self, pinum: u32, name: &str) -> Result<(), FsError> {
        let parent = self.inodes.get(pinum)?;
        if parent.kind != FileKind::Directory {
            return Err(FsError::NotADirectory);
        }
        let parent = parent.clone();
        let Some((dirbno, slot, inum)) = self.lookup_entry(&parent, name) else {
            return Ok(());
        };

        let target = self.inodes.get(inum)?.clone();
        if target.kind == FileKind::Directory && !self.dir_is_empty(&target) {
            return Err(FsError::DirectoryNotEmpty);
        }

        for bno in target.addrs().flatten() {
            self.bitmap.release(bno);
        }
        self.inodes
            .get_mut(inum)
            .expect("target inode checked above")
            .clear();
        self.write_meta();

        let mut block = self.read_block(dirbno);
        dir::set_entry(&mut block, slot, &DirEnt::empty());
        self.write_block(dirbno, &block);
        debug!("unlink {name:?} under {pinum} -> inum {inum} freed");
        Ok(())
    }

    /// Flush written blocks to stable storage.
    pub fn sync(&self) {
        self.dev.sync();
    }

    /// Rewrite the metadata region and sync.
    pub fn flush(&self) {
        self.write_meta();
        self.sync();
    }

    /// Scan every allocated block of `dinode` for `name`. Returns the
    /// holding block, the slot index and the bound inode number.
    fn lookup_entry(&self, dinode: &DInode, name: &str) -> Option<(u32, usize, u32)> {
        for bno in dinode.addrs().flatten() {
            let block = self.read_block(bno);
            if let Some((slot, inum)) = dir::find_name(&block, name) {
                return Some((bno, slot, inum));
            }
        }
        None
    }

    /// First free entry slot in `pinum`'s blocks, growing the directory by
    /// one empty block when every allocated slot is taken.
    fn find_or_grow_slot(&mut self, pinum: u32) -> Result<(u32, usize), FsError> {
        let dinode = self.inodes.get(pinum)?.clone();
        for bno in dinode.addrs().flatten() {
            let block = self.read_block(bno);
            if let Some(slot) = dir::find_free_slot(&block) {
                return Ok((bno, slot));
            }
        }

        let slot = dinode.first_free_slot().ok_or(FsError::DirectoryFull)?;
        let bno = self.balloc()?;
        self.write_block(bno, &dir::empty_dir_block());
        self.inodes
            .get_mut(pinum)
            .expect("parent inode checked above")
            .set_addr(slot, Some(bno));
        debug!("grew directory {pinum} with block {bno}");
        Ok((bno, 0))
    }

    /// A directory is removable when nothing besides `.` and `..` is live.
    fn dir_is_empty(&self, dinode: &DInode) -> bool {
        for bno in dinode.addrs().flatten() {
            let block = self.read_block(bno);
            for slot in 0..dir::DENTS_PER_BLOCK {
                let ent = dir::entry_at(&block, slot);
                if ent.inum.is_some() && ent.name_str() != "." && ent.name_str() != ".." {
                    return false;
                }
            }
        }
        true
    }

    /// Allocate a zeroed data block.
    fn balloc(&mut self) -> Result<u32, FsError> {
        let bno = self.bitmap.find_free().ok_or(FsError::NoFreeBlocks)?;
        self.bitmap.allocate(bno);
        self.write_block(bno, &[0u8; BSIZE]);
        Ok(bno)
    }

    /// Rewrite the three metadata blocks. Does not sync.
    fn write_meta(&self) {
        let mut block = [0u8; BSIZE];
        self.sb.encode_into(&mut block);
        self.dev.write_block(SUPER_BLOCKNO, &block);

        let mut block = [0u8; BSIZE];
        self.inodes.encode_into(&mut block);
        self.dev.write_block(INODE_BLOCKNO, &block);

        let mut block = [0u8; BSIZE];
        self.bitmap.encode_into(&mut block);
        self.dev.write_block(BITMAP_BLOCKNO, &block);
    }

    fn read_block(&self, bno: u32) -> [u8; BSIZE] {
        let mut block = [0u8; BSIZE];
        self.dev.read_block(bno as usize, &mut block);
        block
    }

    fn write_block(&self, bno: u32, data: &[u8]) {
        self.dev.write_block(bno as usize, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_device::MemDisk;
    use crate::disk::IPB;
    use crate::DIRSIZ;

    fn fresh_store() -> MfsStore {
        MfsStore::format(Arc::new(MemDisk::new(FSSIZE)))
    }

    #[test]
    fn format_builds_the_root_directory() {
        let store = fresh_store();
        let st = store.stat(ROOTINO).unwrap();
        assert_eq!(st.kind, FileKind::Directory);
        assert_eq!(store.lookup(ROOTINO, ".").unwrap(), ROOTINO);
        assert_eq!(store.lookup(ROOTINO, "..").unwrap(), ROOTINO);
    }

    #[test]
    fn formatted_image_reopens_identically() {
        let dev = Arc::new(MemDisk::new(FSSIZE));
        let mut store = MfsStore::format(dev.clone());
        let inum = store.create(ROOTINO, FileKind::Regular, "kept").unwrap();
        store.flush();

        let store = MfsStore::open(dev).unwrap();
        assert_eq!(store.lookup(ROOTINO, "kept").unwrap(), inum);
        assert!(store.bitmap.is_allocated(DATA_START as u32));
    }

    #[test]
    fn open_rejects_an_unformatted_device() {
        let err = MfsStore::open(Arc::new(MemDisk::new(FSSIZE))).unwrap_err();
        assert!(matches!(err, FsError::BadImage(_)));
    }

    #[test]
    fn written_blocks_read_back_verbatim() {
        let mut store = fresh_store();
        let inum = store.create(ROOTINO, FileKind::Regular, "data").unwrap();

        let mut data = [0u8; BSIZE];
        data[..3].copy_from_slice(b"str");
        data[BSIZE - 3..].copy_from_slice(b"end");
        store.write(inum, 2, &data).unwrap();
        assert_eq!(store.read(inum, 2).unwrap(), data);
        assert_eq!(store.stat(inum).unwrap().size, 3 * BSIZE as u32);

        // rewriting a lower block must not shrink the size
        store.write(inum, 0, &data).unwrap();
        assert_eq!(store.stat(inum).unwrap().size, 3 * BSIZE as u32);
    }

    #[test]
    fn write_validates_its_target() {
        let mut store = fresh_store();
        let data = [0u8; BSIZE];
        assert_eq!(
            store.write(ROOTINO, 0, &data).unwrap_err(),
            FsError::IsADirectory
        );
        assert_eq!(
            store.write(IPB as u32, 0, &data).unwrap_err(),
            FsError::InvalidInode
        );
        assert_eq!(store.write(1, 0, &data).unwrap_err(), FsError::UnusedInode);

        let inum = store.create(ROOTINO, FileKind::Regular, "f").unwrap();
        assert_eq!(
            store.write(inum, NDIRECT + 1, &data).unwrap_err(),
            FsError::InvalidBlock
        );
        store.write(inum, NDIRECT, &data).unwrap();
    }

    #[test]
    fn read_of_an_unassigned_slot_fails() {
        let mut store = fresh_store();
        let inum = store.create(ROOTINO, FileKind::Regular, "holes").unwrap();
        // the first block is assigned at create; the rest are not
        store.read(inum, 0).unwrap();
        assert_eq!(
            store.read(inum, 1).unwrap_err(),
            FsError::BlockNotAllocated
        );
        assert_eq!(
            store.read(inum, NDIRECT + 1).unwrap_err(),
            FsError::InvalidBlock
        );
        assert_eq!(store.read(2, 0).unwrap_err(), FsError::UnusedInode);
    }

    #[test]
    fn create_then_lookup_round_trips() {
        let mut store = fresh_store();
        let inum = store.create(ROOTINO, FileKind::Regular, "x").unwrap();
        assert_eq!(store.lookup(ROOTINO, "x").unwrap(), inum);
        assert_eq!(store.lookup(ROOTINO, "y").unwrap_err(), FsError::NotFound);
    }

    #[test]
    fn create_rejects_bad_parents_and_names() {
        let mut store = fresh_store();
        let f = store.create(ROOTINO, FileKind::Regular, "f").unwrap();
        assert_eq!(
            store.create(f, FileKind::Regular, "g").unwrap_err(),
            FsError::NotADirectory
        );
        assert_eq!(
            store.create(ROOTINO, FileKind::Regular, "").unwrap_err(),
            FsError::InvalidName
        );
        assert_eq!(
            store
                .create(ROOTINO, FileKind::Regular, &"n".repeat(DIRSIZ))
                .unwrap_err(),
            FsError::InvalidName
        );
        assert_eq!(
            store.create(ROOTINO, FileKind::Unused, "u").unwrap_err(),
            FsError::BadRequest
        );
    }

    #[test]
    fn subdirectories_start_with_dot_entries() {
        let mut store = fresh_store();
        let d = store.create(ROOTINO, FileKind::Directory, "d").unwrap();
        assert_eq!(store.lookup(d, ".").unwrap(), d);
        assert_eq!(store.lookup(d, "..").unwrap(), ROOTINO);
    }

    #[test]
    fn unlink_of_a_missing_name_is_a_noop() {
        let mut store = fresh_store();
        store.unlink(ROOTINO, "missing").unwrap();
    }

    #[test]
    fn unlink_frees_the_inode_and_its_blocks() {
        let mut store = fresh_store();
        let inum = store.create(ROOTINO, FileKind::Regular, "gone").unwrap();
        let data = [7u8; BSIZE];
        store.write(inum, 0, &data).unwrap();
        store.write(inum, 1, &data).unwrap();

        store.unlink(ROOTINO, "gone").unwrap();
        assert_eq!(store.lookup(ROOTINO, "gone").unwrap_err(), FsError::NotFound);

        // the record really is reset, not just unhooked from the parent
        let dinode = store.inodes.get(inum).unwrap();
        assert_eq!(dinode.kind, FileKind::Unused);
        assert!(dinode.addrs().all(|a| a.is_none()));

        // a new file reuses the freed inode and blocks
        assert_eq!(
            store.create(ROOTINO, FileKind::Regular, "next").unwrap(),
            inum
        );
    }

    #[test]
    fn cleared_slots_survive_a_reopen() {
        let dev = Arc::new(MemDisk::new(FSSIZE));
        let mut store = MfsStore::format(dev.clone());
        let inum = store.create(ROOTINO, FileKind::Regular, "gone").unwrap();
        store.write(inum, 3, &[1u8; BSIZE]).unwrap();
        store.unlink(ROOTINO, "gone").unwrap();
        store.flush();

        let store = MfsStore::open(dev).unwrap();
        let dinode = store.inodes.get(inum).unwrap();
        assert_eq!(dinode.kind, FileKind::Unused);
        assert!(dinode.addrs().all(|a| a.is_none()));
    }

    #[test]
    fn non_empty_directories_cannot_be_unlinked() {
        let mut store = fresh_store();
        let d = store.create(ROOTINO, FileKind::Directory, "d").unwrap();
        store.create(d, FileKind::Regular, "f").unwrap();

        assert_eq!(
            store.unlink(ROOTINO, "d").unwrap_err(),
            FsError::DirectoryNotEmpty
        );

        store.unlink(d, "f").unwrap();
        store.unlink(ROOTINO, "d").unwrap();
        assert_eq!(store.lookup(ROOTINO, "d").unwrap_err(), FsError::NotFound);
    }

    #[test]
    fn directory_grows_past_its_first_block() {
        let mut store = fresh_store();
        // `.` and `..` occupy two slots; fill the remainder of the first
        // block, then one more to force a second directory block
        let spare = dir::DENTS_PER_BLOCK - 2;
        for i in 0..spare {
            store
                .insert_for_test(ROOTINO, &format!("f{i}"), 1)
                .unwrap();
        }
        let root = store.inodes.get(ROOTINO).unwrap();
        assert_eq!(root.addr(1), None);

        store.insert_for_test(ROOTINO, "overflow", 1).unwrap();
        let root = store.inodes.get(ROOTINO).unwrap();
        assert!(root.addr(1).is_some());
        assert_eq!(store.lookup(ROOTINO, "overflow").unwrap(), 1);
    }

    #[test]
    fn a_directory_with_every_slot_taken_is_full() {
        let mut store = fresh_store();
        let mut n = 0usize;
        loop {
            match store.insert_for_test(ROOTINO, &format!("f{n}"), 1) {
                Ok(()) => n += 1,
                Err(FsError::DirectoryFull) => break,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        // 14 blocks of 64 slots, minus `.` and `..`
        assert_eq!(n, (NDIRECT + 1) * dir::DENTS_PER_BLOCK - 2);
    }

    #[test]
    fn inode_exhaustion_is_a_capacity_error() {
        let mut store = fresh_store();
        for i in 0..IPB - 1 {
            store
                .create(ROOTINO, FileKind::Regular, &format!("f{i}"))
                .unwrap();
        }
        assert_eq!(
            store
                .create(ROOTINO, FileKind::Regular, "one-too-many")
                .unwrap_err(),
            FsError::NoFreeInodes
        );
    }

    impl MfsStore {
        /// Bind a raw entry without spending an inode, so directory
        /// capacity can be exercised past the 64-inode table.
        fn insert_for_test(&mut self, pinum: u32, name: &str, inum: u32) -> Result<(), FsError> {
            let (dirbno, slot) = self.find_or_grow_slot(pinum)?;
            let mut block = self.read_block(dirbno);
            dir::set_entry(&mut block, slot, &DirEnt::new(name, inum));
            self.write_block(dirbno, &block);
            Ok(())
        }
    }
}

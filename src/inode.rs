use crate::disk::{DInode, FileKind, INODE_SIZE};
use crate::error::FsError;

/// The inode table: a fixed array of on-disk records, mirrored in memory
/// and written back as one block.
pub struct InodeTable {
    inodes: Vec<DInode>,
}

impl InodeTable {
    /// A fresh table with every record unused.
    pub fn new(ninodes: usize) -> Self {
        InodeTable {
            inodes: vec![DInode::default(); ninodes],
        }
    }

    /// Load the table from the inode block, `INODE_SIZE` bytes per record.
    pub fn decode(block: &[u8], ninodes: usize) -> Result<Self, FsError> {
        let mut inodes = Vec::with_capacity(ninodes);
        for i in 0..ninodes {
            let record = &block[i * INODE_SIZE..(i + 1) * INODE_SIZE];
            let dinode = bincode::deserialize(record)
                .map_err(|_| FsError::BadImage(format!("unreadable inode {i}")))?;
            inodes.push(dinode);
        }
        Ok(InodeTable { inodes })
    }

    pub fn encode_into(&self, block: &mut [u8]) {
        for (i, dinode) in self.inodes.iter().enumerate() {
            bincode::serialize_into(&mut block[i * INODE_SIZE..(i + 1) * INODE_SIZE], dinode)
                .expect("inode record fits its slot");
        }
    }

    pub fn get(&self, inum: u32) -> Result<&DInode, FsError> {
        self.inodes.get(inum as usize).ok_or(FsError::InvalidInode)
    }

    pub fn get_mut(&mut self, inum: u32) -> Result<&mut DInode, FsError> {
        self.inodes
            .get_mut(inum as usize)
            .ok_or(FsError::InvalidInode)
    }

    /// First unused record, if the table is not exhausted.
    pub fn find_free(&self) -> Option<u32> {
        self.inodes
            .iter()
            .position(|dinode| dinode.kind == FileKind::Unused)
            .map(|i| i as u32)
    }

    /// Claim `inum` for a new file: kind set, size zero, no addresses.
    pub fn alloc(&mut self, inum: u32, kind: FileKind) {
        let dinode = &mut self.inodes[inum as usize];
        dinode.clear();
        dinode.kind = kind;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BSIZE;

    #[test]
    fn free_scan_skips_claimed_records() {
        let mut table = InodeTable::new(4);
        assert_eq!(table.find_free(), Some(0));

        table.alloc(0, FileKind::Directory);
        table.alloc(1, FileKind::Regular);
        assert_eq!(table.find_free(), Some(2));

        table.alloc(2, FileKind::Regular);
        table.alloc(3, FileKind::Regular);
        assert_eq!(table.find_free(), None);
    }

    #[test]
    fn alloc_resets_the_record() {
        let mut table = InodeTable::new(2);
        let dinode = table.get_mut(1).unwrap();
        dinode.kind = FileKind::Regular;
        dinode.size = 8192;
        dinode.set_addr(0, Some(4));

        table.alloc(1, FileKind::Directory);
        let dinode = table.get(1).unwrap();
        assert_eq!(dinode.kind, FileKind::Directory);
        assert_eq!(dinode.size, 0);
        assert!(dinode.addrs().all(|a| a.is_none()));
    }

    #[test]
    fn out_of_range_numbers_are_invalid() {
        let table = InodeTable::new(4);
        assert!(table.get(3).is_ok());
        assert_eq!(table.get(4).unwrap_err(), FsError::InvalidInode);
    }

    #[test]
    fn table_round_trips_through_a_block() {
        let mut table = InodeTable::new(8);
        table.alloc(0, FileKind::Directory);
        table.get_mut(0).unwrap().set_addr(0, Some(4));
        table.alloc(5, FileKind::Regular);
        table.get_mut(5).unwrap().size = 4096;

        let mut block = [0u8; BSIZE];
        table.encode_into(&mut block);
        let back = InodeTable::decode(&block, 8).unwrap();
        assert_eq!(back.get(0).unwrap(), table.get(0).unwrap());
        assert_eq!(back.get(5).unwrap(), table.get(5).unwrap());
        assert_eq!(back.get(7).unwrap().kind, FileKind::Unused);
    }
}

use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::BSIZE;

/// A fixed-size array of `BSIZE` blocks addressed by block number.
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, blockno: usize, buf: &mut [u8]);
    fn write_block(&self, blockno: usize, buf: &[u8]);
    /// Flush written blocks to stable storage. No-op for volatile devices.
    fn sync(&self) {}
}

/// Disk image backed by a regular file, one block per `BSIZE` slot.
pub struct FileDisk(Mutex<File>);

impl FileDisk {
    /// Open an existing image.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self(Mutex::new(fd)))
    }

    /// Create a fresh image of `nblocks` zeroed blocks, replacing any old one.
    pub fn create(path: impl AsRef<Path>, nblocks: usize) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len((nblocks * BSIZE) as u64)?;
        Ok(Self(Mutex::new(fd)))
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((blockno * BSIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block");
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((blockno * BSIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block");
    }

    fn sync(&self) {
        self.0.lock().unwrap().sync_all().expect("sync error");
    }
}

/// In-memory device for tests; contents do not persist anywhere.
pub struct MemDisk(Mutex<Vec<u8>>);

impl MemDisk {
    pub fn new(nblocks: usize) -> Self {
        Self(Mutex::new(vec![0u8; nblocks * BSIZE]))
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) {
        let blocks = self.0.lock().unwrap();
        buf.copy_from_slice(&blocks[blockno * BSIZE..(blockno + 1) * BSIZE]);
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) {
        let mut blocks = self.0.lock().unwrap();
        blocks[blockno * BSIZE..(blockno + 1) * BSIZE].copy_from_slice(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_disk_round_trips_blocks() {
        let disk = MemDisk::new(8);
        let mut block = [0u8; BSIZE];
        block[0] = 0xab;
        block[BSIZE - 1] = 0xcd;
        disk.write_block(5, &block);

        let mut back = [0u8; BSIZE];
        disk.read_block(5, &mut back);
        assert_eq!(back[0], 0xab);
        assert_eq!(back[BSIZE - 1], 0xcd);

        disk.read_block(4, &mut back);
        assert_eq!(back, [0u8; BSIZE]);
    }
}

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use bcache::BLOCK_SIZE;
use block_dev::BlockDevice;

/// A disk image file exposed as a block device.
#[derive(Debug)]
pub struct BlockFile(Mutex<File>);

impl BlockFile {
    pub fn new(fd: File) -> Self {
        Self(Mutex::new(fd))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_land_at_their_offsets() {
        let fd = tempfile::tempfile().unwrap();
        fd.set_len(4 * BLOCK_SIZE as u64).unwrap();
        let dev = BlockFile::new(fd);

        dev.write_block(2, &[5; BLOCK_SIZE]);
        let mut buf = [1; BLOCK_SIZE];
        dev.read_block(1, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
        dev.read_block(2, &mut buf);
        assert!(buf.iter().all(|&b| b == 5));
    }
}

//! 内存盘

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic;
use core::sync::atomic::AtomicUsize;

use spin::Mutex;

use crate::BlockDevice;

/// 以内存模拟的块设备，会记录读写次数
#[derive(Debug)]
pub struct RamDisk {
    blocks: Vec<Mutex<Box<[u8]>>>,
    block_size: usize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new(block_count: usize, block_size: usize) -> Self {
        Self {
            blocks: (0..block_count)
                .map(|_| Mutex::new(vec![0; block_size].into_boxed_slice()))
                .collect(),
            block_size,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 设备被读过的次数
    pub fn reads(&self) -> usize {
        self.reads.load(atomic::Ordering::Relaxed)
    }

    /// 设备被写过的次数
    pub fn writes(&self) -> usize {
        self.writes.load(atomic::Ordering::Relaxed)
    }

    /// 绕过读写计数，直接查看块内容
    pub fn peek<V>(&self, block_id: usize, f: impl FnOnce(&[u8]) -> V) -> V {
        f(&self.blocks[block_id].lock())
    }

    /// 绕过读写计数，直接改写块内容
    pub fn poke<V>(&self, block_id: usize, f: impl FnOnce(&mut [u8]) -> V) -> V {
        f(&mut self.blocks[block_id].lock())
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        assert_eq!(buf.len(), self.block_size, "not a complete block!");
        buf.copy_from_slice(&self.blocks[block_id].lock());
        self.reads.fetch_add(1, atomic::Ordering::Relaxed);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        assert_eq!(buf.len(), self.block_size, "not a complete block!");
        self.blocks[block_id].lock().copy_from_slice(buf);
        self.writes.fetch_add(1, atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_transfers() {
        let disk = RamDisk::new(4, 8);
        let mut buf = [0u8; 8];

        disk.write_block(2, &[7; 8]);
        disk.read_block(2, &mut buf);
        disk.read_block(3, &mut buf);

        assert_eq!(2, disk.reads());
        assert_eq!(1, disk.writes());
        assert_eq!(0, buf[0]);
        assert!(disk.peek(2, |data| data.iter().all(|&b| b == 7)));
    }

    #[test]
    #[should_panic(expected = "not a complete block!")]
    fn rejects_partial_block() {
        let disk = RamDisk::new(1, 8);
        disk.write_block(0, &[0; 4]);
    }
}

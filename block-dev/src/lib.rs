//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，实现了此特质的类型称为**块设备驱动**。
//!
//! 驱动的读写是同步的：调用返回时数据已搬运完毕，期间可能使调用者休眠。
//! 传输失败属于驱动自身的职责，上层不做任何恢复。

#![no_std]

extern crate alloc;

mod ram;

use core::any::Any;

pub use self::ram::RamDisk;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 把第 `block_id` 块读入 `buf`，`buf` 的长度即一次传输的字节数
    fn read_block(&self, block_id: usize, buf: &mut [u8]);

    /// 把 `buf` 写到第 `block_id` 块
    fn write_block(&self, block_id: usize, buf: &[u8]);

    fn handle_irq(&self) {}
}

#![no_std]

extern crate alloc;

/* 块缓存的整体架构，自上而下 */

// 缓存接口：取块、读块、写块、释放、钉住
mod cache;

// 上锁的缓冲块
mod buf;

// 淘汰策略：挑选牺牲者，必要时跨分片窃取
mod policy;

// 分片表：按块号散列的若干把锁
mod shard;

// 槽位池：以下标相连的节点数组
mod pool;

mod clock;
mod config;
mod id;
mod stats;
pub mod sync;

pub use block_dev::BlockDevice;

pub use self::{
    buf::{Buf, Pinned, Plain},
    cache::{BufferCache, SlotInfo},
    clock::{Clock, Ticks},
    config::{BLOCK_SIZE, Config, ConfigError, NBUF, NSHARD},
    id::{BlockId, BlockNo, DeviceId},
    policy::Policy,
    stats::Stats,
};

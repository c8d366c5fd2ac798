//! # 分片表
//!
//! 把槽位分散到若干把锁之下以降低争用。块号对分片数取模决定块所属的分片，
//! 分片内按链表线性查找。
//!
//! 需要同时持有两把分片锁时（跨分片窃取），必须先持有全局锁，
//! 因此任何时刻最多只有一个线程同时握着两把分片锁，不会出现环路等待。

use alloc::boxed::Box;

use spin::MutexGuard;

use crate::BlockNo;
use crate::pool::{Pool, ShardList};
use crate::sync::SpinLock;

#[derive(Debug)]
pub(crate) struct ShardTable {
    shards: Box<[SpinLock<ShardList>]>,
}

impl ShardTable {
    /// 建立分片表，并把全部槽位轮流分给各分片
    pub fn new(pool: &Pool, nshard: usize) -> Self {
        let mut lists: Box<[ShardList]> = (0..nshard).map(|i| pool.empty_list(i)).collect();
        for slot in 0..pool.nbuf() {
            lists[slot % nshard].push_front(pool, slot);
        }

        Self {
            shards: lists.into_vec().into_iter().map(SpinLock::new).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn hash(&self, blockno: BlockNo) -> usize {
        blockno.raw() as usize % self.shards.len()
    }

    #[inline]
    pub fn lock(&self, shard: usize) -> MutexGuard<'_, ShardList> {
        self.shards[shard].lock()
    }

    /// 除 `target` 外的分片，从 `target` 的下一个开始依次排列
    pub fn probe_order(&self, target: usize) -> impl Iterator<Item = usize> {
        let n = self.shards.len();
        (1..n).map(move |step| (target + step) % n)
    }
}

/// 把槽位从一个分片挪到另一个分片，调用者须持有全局锁和两把分片锁
pub(crate) fn splice(pool: &Pool, from: &mut ShardList, to: &mut ShardList, slot: usize) {
    from.remove(pool, slot);
    to.push_front(pool, slot);
}

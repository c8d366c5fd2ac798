//! # 淘汰策略
//!
//! 缺失时挑选一个引用计数为零的槽位作为牺牲者。调用时已持有全局锁与目标分片锁，
//! 探查其它分片时除目标分片外最多再持有一把分片锁。
//!
//! 全局锁保证了探查期间没有别的线程能改变分片的成员；
//! 但快速路径只需分片锁，因此被探查过、随后放开了锁的分片里的槽位仍可能被命中。

use core::sync::atomic;
use core::sync::atomic::AtomicU64;

use crate::clock::Clock;
use crate::pool::{Pool, ShardList};
use crate::shard::{self, ShardTable};
use crate::stats::Counters;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy {
    /// 近似 LRU：时间戳取自外部时钟，先在目标分片内挑最旧的空闲槽位，
    /// 没有则按固定次序向其它分片窃取第一个找到的分片中最旧的空闲槽位
    #[default]
    Approximate,
    /// 精确 LRU：时间戳取自严格递增的释放序号，每次缺失都在全部分片中挑全局最旧者
    Strict,
}

impl Policy {
    /// 引用计数降为零时打上的时间戳
    pub(crate) fn stamp(self, clock: &dyn Clock, sequence: &AtomicU64) -> u64 {
        match self {
            Self::Approximate => clock.now(),
            Self::Strict => sequence.fetch_add(1, atomic::Ordering::Relaxed) + 1,
        }
    }

    /// 挑出牺牲者并保证它已挂在目标分片上，找不到时返回 `None`
    pub(crate) fn victim(
        self,
        pool: &Pool,
        shards: &ShardTable,
        target: &mut ShardList,
        counters: &Counters,
    ) -> Option<usize> {
        match self {
            Self::Approximate => approximate(pool, shards, target, counters),
            Self::Strict => strict(pool, shards, target, counters, |_| {}),
        }
    }
}

fn approximate(
    pool: &Pool,
    shards: &ShardTable,
    target: &mut ShardList,
    counters: &Counters,
) -> Option<usize> {
    if let Some((slot, _)) = target.oldest_idle(pool) {
        return Some(slot);
    }

    let here = target.shard(pool);
    log::trace!("all {} slots of shard {here} are referenced", target.len());
    for from in shards.probe_order(here) {
        let mut foreign = shards.lock(from);
        if let Some((slot, _)) = foreign.oldest_idle(pool) {
            shard::splice(pool, &mut foreign, target, slot);
            counters.steal();
            log::trace!("steal slot {slot} from shard {from} into shard {here}");
            return Some(slot);
        }
    }

    None
}

/// `reacquire` 在放开探查锁、重新锁住候选所在分片之前调用
fn strict(
    pool: &Pool,
    shards: &ShardTable,
    target: &mut ShardList,
    counters: &Counters,
    mut reacquire: impl FnMut(usize),
) -> Option<usize> {
    let here = target.shard(pool);

    loop {
        // (分片, 槽位, 新旧)
        let mut oldest = target
            .oldest_idle(pool)
            .map(|(slot, age)| (here, slot, age));
        for from in shards.probe_order(here) {
            let Some((slot, age)) = shards.lock(from).oldest_idle(pool) else {
                continue;
            };
            if oldest.is_none_or(|(_, _, best)| age < best) {
                oldest = Some((from, slot, age));
            }
        }

        let (from, slot, _) = oldest?;
        if from == here {
            return Some(slot);
        }

        reacquire(slot);
        let mut foreign = shards.lock(from);
        if pool.refcnt(slot) == 0 {
            shard::splice(pool, &mut foreign, target, slot);
            counters.steal();
            log::trace!("steal slot {slot} from shard {from} into shard {here}");
            return Some(slot);
        }
        // 探查之后它又被命中了，重新挑选
    }
}

//! # 槽位池
//!
//! 固定数量的节点构成的数组，节点之间以下标相连，组成各分片的侵入式双向循环链表。
//! 前 `nbuf` 个节点是缓存槽位，其后 `nshard` 个节点是各分片链表的哨兵头结点。
//!
//! 节点的元数据（身份、引用计数、时间戳、所属分片、前后链接）只在持有
//! **当前挂着该节点的分片锁**时读写，锁本身提供了先后次序，因此字段一律用 `Relaxed` 访问。
//! 调用者通过 `&mut ShardList` 证明自己持有分片锁。

use alloc::boxed::Box;
use core::sync::atomic;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize};

use crate::{BlockId, BlockNo, DeviceId};

const RELAXED: atomic::Ordering = atomic::Ordering::Relaxed;

#[derive(Debug)]
pub(crate) struct Pool {
    nodes: Box<[Node]>,
    nbuf: usize,
}

#[derive(Debug, Default)]
struct Node {
    /// 尚未被任何身份占用过，即初始化后的 `UNASSIGNED` 状态
    unassigned: AtomicBool,
    dev: AtomicU32,
    blockno: AtomicU32,
    refcnt: AtomicU32,
    timestamp: AtomicU64,
    shard: AtomicUsize,
    prev: AtomicUsize,
    next: AtomicUsize,
}

/// 淘汰的先后：从未占用过的槽位排在任何打过时间戳的槽位之前，其余按时间戳
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Age {
    assigned: bool,
    stamp: u64,
}

impl Age {
    #[cfg(test)]
    pub const fn new(assigned: bool, stamp: u64) -> Self {
        Self { assigned, stamp }
    }
}

/// 一个分片的链表，只能在分片锁内拿到
#[derive(Debug)]
pub(crate) struct ShardList {
    head: usize,
    len: usize,
}

impl Pool {
    pub fn new(nbuf: usize, nshard: usize) -> Self {
        let nodes = (0..nbuf + nshard)
            .map(|_| Node {
                unassigned: AtomicBool::new(true),
                ..Node::default()
            })
            .collect();

        Self { nodes, nbuf }
    }

    #[inline]
    pub fn nbuf(&self) -> usize {
        self.nbuf
    }

    /// 第 `shard` 个分片的空链表
    pub fn empty_list(&self, shard: usize) -> ShardList {
        let head = self.nbuf + shard;
        self.nodes[head].prev.store(head, RELAXED);
        self.nodes[head].next.store(head, RELAXED);
        ShardList { head, len: 0 }
    }

    #[inline]
    fn node(&self, slot: usize) -> &Node {
        debug_assert!(slot < self.nbuf, "sentinel {slot} is not a slot");
        &self.nodes[slot]
    }

    pub fn identity(&self, slot: usize) -> Option<BlockId> {
        let node = self.node(slot);
        (!node.unassigned.load(RELAXED)).then(|| {
            BlockId::new(
                DeviceId::new(node.dev.load(RELAXED)),
                BlockNo::new(node.blockno.load(RELAXED)),
            )
        })
    }

    pub fn bind(&self, slot: usize, id: BlockId) {
        let node = self.node(slot);
        node.dev.store(id.dev.raw(), RELAXED);
        node.blockno.store(id.blockno.raw(), RELAXED);
        node.unassigned.store(false, RELAXED);
    }

    #[inline]
    pub fn refcnt(&self, slot: usize) -> u32 {
        self.node(slot).refcnt.load(RELAXED)
    }

    #[inline]
    pub fn set_refcnt(&self, slot: usize, refcnt: u32) {
        self.node(slot).refcnt.store(refcnt, RELAXED);
    }

    #[inline]
    pub fn timestamp(&self, slot: usize) -> u64 {
        self.node(slot).timestamp.load(RELAXED)
    }

    pub fn age(&self, slot: usize) -> Age {
        let node = self.node(slot);
        Age {
            assigned: !node.unassigned.load(RELAXED),
            stamp: node.timestamp.load(RELAXED),
        }
    }

    #[inline]
    pub fn set_timestamp(&self, slot: usize, timestamp: u64) {
        self.node(slot).timestamp.store(timestamp, RELAXED);
    }

    #[inline]
    pub fn shard(&self, slot: usize) -> usize {
        self.node(slot).shard.load(RELAXED)
    }

    #[inline]
    fn next(&self, index: usize) -> usize {
        self.nodes[index].next.load(RELAXED)
    }

    #[inline]
    fn prev(&self, index: usize) -> usize {
        self.nodes[index].prev.load(RELAXED)
    }
}

impl ShardList {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn shard(&self, pool: &Pool) -> usize {
        self.head - pool.nbuf
    }

    /// 从表头到表尾遍历槽位
    pub fn iter<'a>(&'a self, pool: &'a Pool) -> impl Iterator<Item = usize> + 'a {
        let mut cursor = pool.next(self.head);
        core::iter::from_fn(move || {
            (cursor != self.head).then(|| {
                let slot = cursor;
                cursor = pool.next(cursor);
                slot
            })
        })
    }

    pub fn find(&self, pool: &Pool, id: BlockId) -> Option<usize> {
        self.iter(pool).find(|&slot| pool.identity(slot) == Some(id))
    }

    /// 引用计数为零的槽位中最老者，同样老时取先扫描到的
    pub fn oldest_idle(&self, pool: &Pool) -> Option<(usize, Age)> {
        self.iter(pool)
            .filter(|&slot| pool.refcnt(slot) == 0)
            .map(|slot| (slot, pool.age(slot)))
            .fold(None, |oldest, (slot, age)| match oldest {
                Some((_, best)) if best <= age => oldest,
                _ => Some((slot, age)),
            })
    }

    /// 把槽位挂到表头
    pub fn push_front(&mut self, pool: &Pool, slot: usize) {
        let head = self.head;
        let first = pool.next(head);
        let node = pool.node(slot);
        node.next.store(first, RELAXED);
        node.prev.store(head, RELAXED);
        node.shard.store(self.shard(pool), RELAXED);
        pool.nodes[first].prev.store(slot, RELAXED);
        pool.nodes[head].next.store(slot, RELAXED);
        self.len += 1;
    }

    /// 把槽位从链表中摘下
    ///
    /// # Panics
    ///
    /// 槽位不在本链表中时panic。
    pub fn remove(&mut self, pool: &Pool, slot: usize) {
        assert_eq!(
            self.shard(pool),
            pool.shard(slot),
            "slot {slot} is not on this shard"
        );
        let (prev, next) = (pool.prev(slot), pool.next(slot));
        pool.nodes[prev].next.store(next, RELAXED);
        pool.nodes[next].prev.store(prev, RELAXED);
        self.len -= 1;
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec;
    use std::vec::Vec;

    use super::*;

    fn id(blockno: u32) -> BlockId {
        BlockId::new(DeviceId::new(1), BlockNo::new(blockno))
    }

    #[test]
    fn list_links_in_both_directions() {
        let pool = Pool::new(4, 2);
        let mut a = pool.empty_list(0);
        let mut b = pool.empty_list(1);
        for slot in 0..4 {
            a.push_front(&pool, slot);
        }
        assert_eq!(vec![3, 2, 1, 0], a.iter(&pool).collect::<Vec<_>>());

        a.remove(&pool, 2);
        b.push_front(&pool, 2);
        assert_eq!(vec![3, 1, 0], a.iter(&pool).collect::<Vec<_>>());
        assert_eq!(vec![2], b.iter(&pool).collect::<Vec<_>>());
        assert_eq!((3, 1), (a.len(), b.len()));
        assert_eq!(1, pool.shard(2));

        a.remove(&pool, 3);
        a.remove(&pool, 0);
        a.remove(&pool, 1);
        assert_eq!(0, a.iter(&pool).count());
    }

    #[test]
    fn unassigned_slots_never_match() {
        let pool = Pool::new(2, 1);
        let mut list = pool.empty_list(0);
        list.push_front(&pool, 0);
        list.push_front(&pool, 1);

        assert_eq!(None, list.find(&pool, id(0)));
        pool.bind(1, id(0));
        assert_eq!(Some(1), list.find(&pool, id(0)));
    }

    #[test]
    fn oldest_idle_skips_referenced_and_keeps_first_on_tie() {
        let pool = Pool::new(3, 1);
        let mut list = pool.empty_list(0);
        for slot in 0..3 {
            list.push_front(&pool, slot);
        }
        // 遍历顺序为 2, 1, 0
        for slot in 0..3 {
            pool.bind(slot, id(slot as u32));
        }
        pool.set_timestamp(2, 5);
        pool.set_timestamp(1, 5);
        pool.set_timestamp(0, 1);
        pool.set_refcnt(0, 1);
        assert_eq!(Some((2, Age::new(true, 5))), list.oldest_idle(&pool));

        pool.set_refcnt(2, 1);
        pool.set_refcnt(1, 1);
        assert_eq!(None, list.oldest_idle(&pool));
    }

    #[test]
    fn unassigned_slot_goes_before_stamped_idle_one() {
        let pool = Pool::new(2, 1);
        let mut list = pool.empty_list(0);
        list.push_front(&pool, 0);
        list.push_front(&pool, 1);
        // 槽位 1 在前，时间戳同为 0，但槽位 0 从未用过
        pool.bind(1, id(3));
        assert_eq!(Some((0, Age::new(false, 0))), list.oldest_idle(&pool));

        pool.bind(0, id(5));
        pool.set_timestamp(0, 1);
        assert_eq!(Some((1, Age::new(true, 0))), list.oldest_idle(&pool));
    }
}

use core::sync::atomic;
use core::sync::atomic::AtomicU64;

/// 缓存运行统计的快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// 在缓存中找到了块
    pub hits: u64,
    /// 没找到块，回收了一个槽位
    pub misses: u64,
    /// 回收的槽位是从别的分片窃取来的
    pub steals: u64,
    /// 读设备次数
    pub reads: u64,
    /// 写设备次数
    pub writes: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    steals: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Counters {
    #[inline]
    pub fn hit(&self) {
        self.hits.fetch_add(1, atomic::Ordering::Relaxed);
    }

    #[inline]
    pub fn miss(&self) {
        self.misses.fetch_add(1, atomic::Ordering::Relaxed);
    }

    #[inline]
    pub fn steal(&self) {
        self.steals.fetch_add(1, atomic::Ordering::Relaxed);
    }

    #[inline]
    pub fn read(&self) {
        self.reads.fetch_add(1, atomic::Ordering::Relaxed);
    }

    #[inline]
    pub fn write(&self) {
        self.writes.fetch_add(1, atomic::Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            hits: self.hits.load(atomic::Ordering::Relaxed),
            misses: self.misses.load(atomic::Ordering::Relaxed),
            steals: self.steals.load(atomic::Ordering::Relaxed),
            reads: self.reads.load(atomic::Ordering::Relaxed),
            writes: self.writes.load(atomic::Ordering::Relaxed),
        }
    }
}

//! 逻辑时钟
//!
//! 缓存只用时钟比较新旧，不在乎精度，只要求读数单调不减，且读取时无需加锁。

use core::sync::atomic;
use core::sync::atomic::AtomicU64;

pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// 时钟中断计数，由中断处理函数调用 [`Ticks::tick`] 推进
#[derive(Debug, Default)]
pub struct Ticks(AtomicU64);

impl Ticks {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn tick(&self) {
        self.0.fetch_add(1, atomic::Ordering::Relaxed);
    }
}

impl Clock for Ticks {
    #[inline]
    fn now(&self) -> u64 {
        self.0.load(atomic::Ordering::Relaxed)
    }
}

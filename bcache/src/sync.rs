//! 缓存用到的锁
//!
//! - 分片锁与全局锁只保护很短的临界区（扫描链表、改引用计数、摘挂节点），用自旋锁即可。
//! - 缓冲锁可能跨越一次设备传输，持有者随时会休眠，
//!   争用者不能空转，只能通过让步策略 `R` 把处理器让给别的线程。
//!   内核里的 `R` 把当前任务挂起并调度下一个任务；宿主环境下默认调用 `thread::yield_now`。

use spin::mutex::{TicketMutex, TicketMutexGuard};
use spin::relax::RelaxStrategy;

/// 缓冲锁争用时的默认让步策略
#[cfg(feature = "std")]
pub type Park = spin::relax::Yield;
#[cfg(not(feature = "std"))]
pub type Park = spin::relax::Spin;

pub(crate) type SpinLock<T> = spin::Mutex<T>;

/// 睡眠锁
///
/// 基于票号排队，等候者按到达顺序拿到锁，不会被饿死。
pub struct SleepLock<T, R = Park> {
    inner: TicketMutex<T, R>,
}

pub type SleepLockGuard<'a, T> = TicketMutexGuard<'a, T>;

impl<T, R: RelaxStrategy> SleepLock<T, R> {
    pub fn new(value: T) -> Self {
        Self {
            inner: TicketMutex::new(value),
        }
    }

    #[inline]
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        self.inner.lock()
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        self.inner.try_lock()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn excludes_concurrent_holders() {
        let lock: SleepLock<usize> = SleepLock::new(0);
        let inside = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        let mut guard = lock.lock();
                        assert_eq!(0, inside.fetch_add(1, Ordering::SeqCst));
                        *guard += 1;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(4000, *lock.lock());
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock: SleepLock<()> = SleepLock::new(());
        let guard = lock.lock();
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }
}

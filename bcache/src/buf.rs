//! # 缓冲块
//!
//! [`Buf`] 就是持有中的缓冲锁：拿到它即独占该槽位的数据，丢弃它即释放。
//! 缓冲锁之外，槽位还被引用计数保活，计数不为零的槽位不会被回收。

use core::mem;

use spin::relax::RelaxStrategy;

use crate::sync::{Park, SleepLockGuard};
use crate::{BLOCK_SIZE, BlockId, BlockNo, BufferCache, DeviceId};

/// 槽位数据，受缓冲锁保护
#[repr(C, align(8))]
pub(crate) struct Payload {
    data: [u8; BLOCK_SIZE],
    /// 数据与设备上 `owner` 块的内容一致
    valid: bool,
    /// 最近一次以哪个身份持有过缓冲锁
    owner: Option<BlockId>,
}

/// 可由任意字节解释出的类型，用于在块内原地读写结构体
///
/// # Safety
///
/// 实现者的任意位模式都必须合法，且对齐不超过 8。
pub unsafe trait Plain: Sized {}

macro_rules! plain {
    ($($ty:ty),*) => {
        $(unsafe impl Plain for $ty {})*
    };
}

plain!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}

/// 上锁的缓冲块
pub struct Buf<'a, R: RelaxStrategy = Park> {
    pub(crate) cache: &'a BufferCache<R>,
    pub(crate) slot: usize,
    pub(crate) id: BlockId,
    // `Option`是为了在释放时先放开缓冲锁，再归还引用计数
    payload: Option<SleepLockGuard<'a, Payload>>,
}

/// 钉住槽位的凭据，交还给 [`BufferCache::unpin`] 后解除
#[must_use = "a pinned buffer stays in the cache until it is unpinned"]
#[derive(Debug, PartialEq, Eq)]
pub struct Pinned {
    /// 签发凭据的缓存的地址
    pub(crate) cache: usize,
    pub(crate) slot: usize,
    pub(crate) id: BlockId,
}

impl Payload {
    pub fn new() -> Self {
        Self {
            data: [0; BLOCK_SIZE],
            valid: false,
            owner: None,
        }
    }
}

impl<'a, R: RelaxStrategy> Buf<'a, R> {
    /// 以 `id` 身份接管槽位数据；身份变了说明槽位被回收过，旧数据作废
    pub(crate) fn new(
        cache: &'a BufferCache<R>,
        slot: usize,
        id: BlockId,
        mut payload: SleepLockGuard<'a, Payload>,
    ) -> Self {
        if payload.owner != Some(id) {
            payload.owner = Some(id);
            payload.valid = false;
        }

        Self {
            cache,
            slot,
            id,
            payload: Some(payload),
        }
    }

    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    #[inline]
    pub fn dev(&self) -> DeviceId {
        self.id.dev
    }

    #[inline]
    pub fn blockno(&self) -> BlockNo {
        self.id.blockno
    }

    /// 槽位在缓冲池中的下标
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// 数据是否反映了设备上的内容
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.payload().valid
    }

    pub(crate) fn set_valid(&mut self) {
        self.payload_mut().valid = true;
    }

    #[inline]
    pub fn data(&self) -> &[u8; BLOCK_SIZE] {
        &self.payload().data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        &mut self.payload_mut().data
    }

    pub fn get<T: Plain>(&self, offset: usize) -> &T {
        Self::check::<T>(offset);
        let addr = self.data()[offset..].as_ptr().cast::<T>();
        unsafe { &*addr }
    }

    pub fn get_mut<T: Plain>(&mut self, offset: usize) -> &mut T {
        Self::check::<T>(offset);
        let addr = self.data_mut()[offset..].as_mut_ptr().cast::<T>();
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Plain, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Plain, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

impl<R: RelaxStrategy> Buf<'_, R> {
    #[inline]
    fn payload(&self) -> &Payload {
        self.payload.as_deref().unwrap()
    }

    #[inline]
    fn payload_mut(&mut self) -> &mut Payload {
        self.payload.as_deref_mut().unwrap()
    }

    fn check<T>(offset: usize) {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        assert!(mem::align_of::<T>() <= mem::align_of::<Payload>());
        assert_eq!(0, offset % mem::align_of::<T>(), "misaligned offset {offset}");
    }
}

impl<R: RelaxStrategy> Drop for Buf<'_, R> {
    fn drop(&mut self) {
        self.payload = None;
        self.cache.put(self.slot, self.id);
    }
}

impl<R: RelaxStrategy> core::fmt::Debug for Buf<'_, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buf")
            .field("slot", &self.slot)
            .field("id", &self.id)
            .field("valid", &self.is_valid())
            .finish()
    }
}

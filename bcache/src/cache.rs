//! # 块缓存层
//!
//! 块设备读写速度远慢于内存，因此在内存中保留一批块的副本，减少重复的设备传输；
//! 同时缓存也是多个内核线程并发访问同一块时唯一的同步点。
//!
//! 使用方式：
//! - 用 [`BufferCache::read`] 取得某块的上锁缓冲，必要时会从设备读入；
//! - 修改数据后用 [`BufferCache::write`] 写回设备；
//! - 用完后交还给 [`BufferCache::release`]，或直接丢弃 [`Buf`]；
//! - 缓冲同一时刻只属于一个线程，不要长时间霸占。
//!
//! 查找先只锁目标分片（快速路径）；缺失时再依次锁全局锁与目标分片，
//! 重查一遍后交由 [`Policy`](crate::Policy) 回收槽位。加锁顺序恒为：全局锁、分片锁、缓冲锁。
//! 同一线程重复获取自己手上的块会死锁。

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ptr;
use core::sync::atomic::AtomicU64;

use block_dev::BlockDevice;
use spin::relax::RelaxStrategy;

use crate::buf::{Buf, Payload, Pinned};
use crate::clock::Clock;
use crate::config::{Config, ConfigError};
use crate::pool::Pool;
use crate::shard::ShardTable;
use crate::stats::{Counters, Stats};
use crate::sync::{Park, SleepLock, SpinLock};
use crate::{BlockId, BlockNo, DeviceId};

pub struct BufferCache<R = Park> {
    config: Config,
    pool: Pool,
    shards: ShardTable,
    /// 串行化缺失路径：跨分片窃取与新身份的插入
    global: SpinLock<()>,
    buffers: Box<[SleepLock<Payload, R>]>,
    devices: BTreeMap<DeviceId, Arc<dyn BlockDevice>>,
    clock: Arc<dyn Clock>,
    /// [`Policy::Strict`](crate::Policy::Strict) 的释放序号
    sequence: AtomicU64,
    counters: Counters,
}

/// 某个槽位在某一时刻的样子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub slot: usize,
    pub shard: usize,
    /// `None` 表示自初始化以来从未被使用过
    pub identity: Option<BlockId>,
    pub refcnt: u32,
    pub timestamp: u64,
}

impl SlotInfo {
    #[inline]
    pub fn is_evictable(&self) -> bool {
        self.refcnt == 0
    }
}

impl BufferCache<Park> {
    /// 建立缓存，须在任何使用之前于启动时调用一次
    ///
    /// 缓冲锁的等待者使用 [`Park`]：开启 `std` 时每次争用失败都
    /// `thread::yield_now`，并非真正挂起；内核应通过 [`BufferCache::with_relax`]
    /// 换上让调度器切走当前任务的策略。
    ///
    /// # Panics
    ///
    /// 配置不合法时panic。
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self::with_relax(config, clock)
    }

    pub fn try_new(config: Config, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        Self::try_with_relax(config, clock)
    }
}

impl<R: RelaxStrategy> BufferCache<R> {
    /// 与 [`BufferCache::new`] 相同，但缓冲锁争用时按 `R` 让出处理器
    pub fn with_relax(config: Config, clock: Arc<dyn Clock>) -> Self {
        match Self::try_with_relax(config, clock) {
            Ok(cache) => cache,
            Err(err) => panic!("binit: {err}"),
        }
    }

    pub fn try_with_relax(config: Config, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;

        let pool = Pool::new(config.nbuf, config.nshard);
        let shards = ShardTable::new(&pool, config.nshard);
        let buffers = (0..config.nbuf)
            .map(|_| SleepLock::new(Payload::new()))
            .collect();
        log::debug!(
            "buffer cache: {} slots in {} shards, {:?} eviction",
            config.nbuf,
            config.nshard,
            config.policy
        );

        Ok(Self {
            config,
            pool,
            shards,
            global: SpinLock::new(()),
            buffers,
            devices: BTreeMap::new(),
            clock,
            sequence: AtomicU64::new(0),
            counters: Counters::default(),
        })
    }

    /// 登记设备驱动，只能在缓存被共享之前进行；返回该设备号下原先的驱动
    pub fn attach(
        &mut self,
        dev: DeviceId,
        device: Arc<dyn BlockDevice>,
    ) -> Option<Arc<dyn BlockDevice>> {
        self.devices.insert(dev, device)
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 取得绑定到 `(dev, blockno)` 的上锁缓冲，引用计数加一；数据未必有效
    ///
    /// # Panics
    ///
    /// 所有槽位都在使用中时panic。
    pub fn get(&self, dev: DeviceId, blockno: BlockNo) -> Buf<'_, R> {
        let id = BlockId::new(dev, blockno);
        let target = self.shards.hash(blockno);

        let list = self.shards.lock(target);
        if let Some(slot) = list.find(&self.pool, id) {
            self.pool.set_refcnt(slot, self.pool.refcnt(slot) + 1);
            drop(list);
            self.counters.hit();
            return self.lock_buffer(slot, id);
        }
        drop(list);

        let global = self.global.lock();
        let mut list = self.shards.lock(target);
        // 放开分片锁的间隙里，别的线程可能已经插入了它
        if let Some(slot) = list.find(&self.pool, id) {
            self.pool.set_refcnt(slot, self.pool.refcnt(slot) + 1);
            drop(list);
            drop(global);
            self.counters.hit();
            return self.lock_buffer(slot, id);
        }

        let Some(slot) =
            self.config
                .policy
                .victim(&self.pool, &self.shards, &mut list, &self.counters)
        else {
            log::error!("bget: every slot is referenced, cannot cache {id}");
            panic!("bget: no buffers");
        };
        if let Some(old) = self.pool.identity(slot) {
            log::trace!("evict {old} from slot {slot} for {id}");
        }
        self.pool.bind(slot, id);
        self.pool.set_refcnt(slot, 1);
        drop(list);
        drop(global);
        self.counters.miss();

        self.lock_buffer(slot, id)
    }

    /// 取得 `(dev, blockno)` 内容有效的上锁缓冲
    pub fn read(&self, dev: DeviceId, blockno: BlockNo) -> Buf<'_, R> {
        let mut buf = self.get(dev, blockno);
        if !buf.is_valid() {
            self.transfer(&mut buf, false);
            buf.set_valid();
        }
        buf
    }

    /// 把缓冲写回设备
    ///
    /// # Panics
    ///
    /// 缓冲不是经由本缓存上锁的时panic。
    pub fn write(&self, buf: &mut Buf<'_, R>) {
        assert!(ptr::eq(buf.cache, self), "bwrite: buffer not locked by this cache");
        self.transfer(buf, true);
        buf.set_valid();
    }

    /// 放开缓冲锁并归还引用
    ///
    /// # Panics
    ///
    /// 缓冲不是经由本缓存上锁的时panic。
    pub fn release(&self, buf: Buf<'_, R>) {
        assert!(ptr::eq(buf.cache, self), "brelse: buffer not locked by this cache");
        drop(buf);
    }

    /// 额外持有一份引用，使槽位在缓冲释放后仍不会被回收
    pub fn pin(&self, buf: &Buf<'_, R>) -> Pinned {
        assert!(ptr::eq(buf.cache, self), "bpin: buffer not locked by this cache");
        let _list = self.shards.lock(self.shards.hash(buf.id.blockno));
        self.pool.set_refcnt(buf.slot, self.pool.refcnt(buf.slot) + 1);

        Pinned {
            cache: self.addr(),
            slot: buf.slot,
            id: buf.id,
        }
    }

    /// 交还钉住凭据
    ///
    /// # Panics
    ///
    /// 凭据不是由本缓存签发的时panic。
    pub fn unpin(&self, pinned: Pinned) {
        assert_eq!(
            self.addr(),
            pinned.cache,
            "bunpin: {} was not pinned by this cache",
            pinned.id
        );
        self.put(pinned.slot, pinned.id);
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    /// 逐个分片查看全部槽位，按槽位下标排列
    ///
    /// 同一分片内的信息是一致的，分片之间不是同一时刻的快照。
    pub fn slots(&self) -> Vec<SlotInfo> {
        let _global = self.global.lock();
        let mut slots = Vec::with_capacity(self.pool.nbuf());
        for shard in 0..self.shards.len() {
            let list = self.shards.lock(shard);
            slots.extend(list.iter(&self.pool).map(|slot| SlotInfo {
                slot,
                shard,
                identity: self.pool.identity(slot),
                refcnt: self.pool.refcnt(slot),
                timestamp: self.pool.timestamp(slot),
            }));
        }
        slots.sort_unstable_by_key(|info| info.slot);

        slots
    }
}

impl<R: RelaxStrategy> BufferCache<R> {
    fn lock_buffer(&self, slot: usize, id: BlockId) -> Buf<'_, R> {
        Buf::new(self, slot, id, self.buffers[slot].lock())
    }

    /// 引用计数减一，降为零时记下时间戳
    ///
    /// 持有引用的槽位必然挂在其块号对应的分片上：回收时它被挂到目标分片，
    /// 之后只有引用计数为零才可能被挪走。
    pub(crate) fn put(&self, slot: usize, id: BlockId) {
        let shard = self.shards.hash(id.blockno);
        let _list = self.shards.lock(shard);
        debug_assert_eq!(shard, self.pool.shard(slot));

        let refcnt = self
            .pool
            .refcnt(slot)
            .checked_sub(1)
            .expect("brelse: refcnt underflow");
        self.pool.set_refcnt(slot, refcnt);
        if refcnt == 0 {
            let stamp = self.config.policy.stamp(self.clock.as_ref(), &self.sequence);
            self.pool.set_timestamp(slot, stamp);
        }
    }

    fn addr(&self) -> usize {
        ptr::from_ref(self).addr()
    }

    fn transfer(&self, buf: &mut Buf<'_, R>, write: bool) {
        let Some(device) = self.devices.get(&buf.id.dev) else {
            log::error!("no driver attached for device {}", buf.id.dev);
            panic!("bio: no device {}", buf.id.dev);
        };
        let block_id = buf.id.blockno.raw() as usize;

        if write {
            device.write_block(block_id, buf.data());
            self.counters.write();
        } else {
            device.read_block(block_id, buf.data_mut());
            self.counters.read();
        }
    }
}

impl<R> fmt::Debug for BufferCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferCache")
            .field("config", &self.config)
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

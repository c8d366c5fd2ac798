use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use bcache::{BLOCK_SIZE, BlockNo, BufferCache, Config, DeviceId, Policy, Ticks};
use block_dev::RamDisk;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEV: DeviceId = DeviceId::new(1);

fn setup(config: Config, blocks: usize) -> (BufferCache, Arc<RamDisk>, Arc<Ticks>) {
    let disk = Arc::new(RamDisk::new(blocks, BLOCK_SIZE));
    let ticks = Arc::new(Ticks::new());
    let mut cache = BufferCache::new(config, ticks.clone());
    cache.attach(DEV, disk.clone());
    (cache, disk, ticks)
}

fn counter(data: &[u8; BLOCK_SIZE]) -> u64 {
    u64::from_le_bytes(data[..8].try_into().unwrap())
}

#[test]
fn same_block_resolves_to_one_slot() {
    const THREADS: usize = 8;
    let (cache, disk, _) = setup(Config::new(16, 4), 4);
    let barrier = Barrier::new(THREADS);

    let slots: HashSet<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    let buf = cache.read(DEV, BlockNo::new(3));
                    buf.slot()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(1, slots.len());
    assert_eq!(1, disk.reads());
    let info = cache.slots();
    let slot = *slots.iter().next().unwrap();
    assert_eq!(0, info[slot].refcnt);
}

fn hammer(policy: Policy, seed: u64) {
    const THREADS: usize = 6;
    const ROUNDS: usize = 400;
    const BLOCKS: u32 = 24;

    // 每个线程最多同时持有两块，槽位要多于 12
    let (cache, disk, ticks) = setup(Config::new(13, 5).with_policy(policy), BLOCKS as usize);
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::Relaxed) {
                let mut seen = HashSet::new();
                for info in cache.slots() {
                    if let Some(id) = info.identity {
                        assert!(seen.insert(id), "{id} cached twice");
                    }
                }
                ticks.tick();
                thread::yield_now();
            }
        });

        let workers: Vec<_> = (0..THREADS as u64)
            .map(|t| {
                let cache = &cache;
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed + t);
                    for _ in 0..ROUNDS {
                        let a = rng.gen_range(0..BLOCKS);
                        let mut buf = cache.read(DEV, BlockNo::new(a));
                        let next = counter(buf.data()) + 1;
                        buf.data_mut()[..8].copy_from_slice(&next.to_le_bytes());
                        cache.write(&mut buf);

                        // 偶尔再拿一块更大的块号，并钉住它跨过释放；按块号升序加锁以免死锁
                        if a + 1 < BLOCKS && rng.gen_bool(0.2) {
                            let b = rng.gen_range(a + 1..BLOCKS);
                            let other = cache.read(DEV, BlockNo::new(b));
                            let pinned = cache.pin(&other);
                            cache.release(other);
                            cache.unpin(pinned);
                        }
                        cache.release(buf);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, Ordering::Relaxed);
    });

    let total: u64 = (0..BLOCKS)
        .map(|blockno| counter(cache.read(DEV, BlockNo::new(blockno)).data()))
        .sum();
    assert_eq!((THREADS * ROUNDS) as u64, total);

    let on_disk: u64 = (0..BLOCKS as usize)
        .map(|blockno| disk.peek(blockno, |data| u64::from_le_bytes(data[..8].try_into().unwrap())))
        .sum();
    assert_eq!(total, on_disk);
    assert!(cache.slots().iter().all(|info| info.refcnt == 0));
}

#[test]
fn concurrent_updates_are_never_lost_approximate() {
    hammer(Policy::Approximate, 7);
}

#[test]
fn concurrent_updates_are_never_lost_strict() {
    hammer(Policy::Strict, 11);
}

#[test]
fn pinned_slots_survive_eviction_pressure() {
    let (cache, disk, ticks) = setup(Config::new(6, 3), 64);

    let pinned: Vec<_> = [10, 11]
        .into_iter()
        .map(|blockno| {
            let mut buf = cache.read(DEV, BlockNo::new(blockno));
            buf.data_mut()[0] = blockno as u8;
            let pin = cache.pin(&buf);
            (buf.slot(), pin)
        })
        .collect();

    thread::scope(|s| {
        for t in 0..3u32 {
            let cache = &cache;
            let ticks = &ticks;
            s.spawn(move || {
                for round in 0..200 {
                    let blockno = 20 + (t * 200 + round) % 40;
                    drop(cache.read(DEV, BlockNo::new(blockno)));
                    ticks.tick();
                }
            });
        }
    });

    let reads = disk.reads();
    for (blockno, (slot, pin)) in [10u32, 11].into_iter().zip(pinned) {
        let buf = cache.read(DEV, BlockNo::new(blockno));
        assert_eq!(slot, buf.slot());
        assert_eq!(blockno as u8, buf.data()[0]);
        drop(buf);
        cache.unpin(pin);
    }
    assert_eq!(reads, disk.reads());
}

//! A multi-threaded read-modify-write workload over the cache.
//!
//! Every round bumps the counter at the head of one block, so after a run the
//! counters of all blocks must have grown by exactly the number of rounds. A
//! lost update means two threads held the same block at once, or the block was
//! cached twice.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bcache::{BlockNo, Buf, BufferCache, DeviceId, Ticks};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Chance that a round also touches a second block while holding the first.
const SECOND_BLOCK_CHANCE: f64 = 0.25;

#[derive(Debug, Clone, Copy)]
pub struct Workload {
    pub dev: DeviceId,
    pub blocks: u32,
    pub threads: usize,
    pub rounds: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub ops: u64,
    pub before: u64,
    pub after: u64,
}

impl Workload {
    /// Buffers a single worker may hold at the same time.
    pub const HELD_PER_WORKER: usize = 2;

    pub fn run(&self, cache: &BufferCache, ticks: &Ticks) -> io::Result<Report> {
        let before = self.sum(cache);
        let done = AtomicBool::new(false);

        let panicked = thread::scope(|s| {
            // stands in for the timer interrupt
            s.spawn(|| {
                while !done.load(Ordering::Relaxed) {
                    ticks.tick();
                    thread::sleep(Duration::from_millis(1));
                }
            });

            let workers: Vec<_> = (0..self.threads)
                .map(|index| s.spawn(move || self.worker(cache, index)))
                .collect();
            let panicked = workers
                .into_iter()
                .map(|worker| worker.join())
                .filter(Result::is_err)
                .count();
            done.store(true, Ordering::Relaxed);
            panicked
        });
        if panicked > 0 {
            return Err(io::Error::other(format!("{panicked} workers panicked")));
        }

        let report = Report {
            ops: (self.threads * self.rounds) as u64,
            before,
            after: self.sum(cache),
        };
        if report.after.wrapping_sub(report.before) != report.ops {
            return Err(io::Error::other(format!(
                "lost updates: counters grew by {} over {} operations",
                report.after.wrapping_sub(report.before),
                report.ops
            )));
        }

        Ok(report)
    }

    fn worker(&self, cache: &BufferCache, index: usize) {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(index as u64));

        for _ in 0..self.rounds {
            let first = rng.gen_range(0..self.blocks);
            let mut buf = cache.read(self.dev, BlockNo::new(first));
            bump(&mut buf);
            cache.write(&mut buf);

            // higher block numbers only, so two workers never wait on each other
            if first + 1 < self.blocks && rng.gen_bool(SECOND_BLOCK_CHANCE) {
                let second = rng.gen_range(first + 1..self.blocks);
                let other = cache.read(self.dev, BlockNo::new(second));
                let pinned = cache.pin(&other);
                cache.release(other);
                cache.unpin(pinned);
            }
            cache.release(buf);
        }
        log::info!("worker {index} finished {} rounds", self.rounds);
    }

    fn sum(&self, cache: &BufferCache) -> u64 {
        (0..self.blocks)
            .map(|blockno| {
                cache
                    .read(self.dev, BlockNo::new(blockno))
                    .map(0, |counter: &u64| *counter)
            })
            .fold(0, u64::wrapping_add)
    }
}

fn bump(buf: &mut Buf<'_>) {
    buf.map_mut(0, |counter: &mut u64| *counter = counter.wrapping_add(1));
}

mod block_file;
mod cli;
mod workload;

use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use bcache::{BLOCK_SIZE, BufferCache, Config, DeviceId, Ticks};
use clap::Parser;

pub use self::{block_file::BlockFile, cli::Cli, workload::Workload};

const ROOT_DEV: DeviceId = DeviceId::new(1);

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    println!("image={:?}\nblocks={}", cli.image, cli.blocks);

    let config = Config::new(cli.nbuf, cli.nshard).with_policy(cli.policy.into());
    config.validate().map_err(io::Error::other)?;
    if cli.threads * Workload::HELD_PER_WORKER >= cli.nbuf {
        return Err(io::Error::other(format!(
            "{} workers may hold {} buffers, more than the {} slots allow",
            cli.threads,
            cli.threads * Workload::HELD_PER_WORKER,
            cli.nbuf
        )));
    }
    if cli.blocks == 0 {
        return Err(io::Error::other("the image needs at least one block"));
    }

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&cli.image)?;
    fd.set_len(u64::from(cli.blocks) * BLOCK_SIZE as u64)?;

    let ticks = Arc::new(Ticks::new());
    let mut cache = BufferCache::new(config, ticks.clone());
    cache.attach(ROOT_DEV, Arc::new(BlockFile::new(fd)));
    log::info!("{cache:?}");

    let workload = Workload {
        dev: ROOT_DEV,
        blocks: cli.blocks,
        threads: cli.threads,
        rounds: cli.rounds,
        seed: cli.seed,
    };
    let report = workload.run(&cache, &ticks)?;

    let stats = cache.stats();
    println!(
        "ops={} counters={}->{}",
        report.ops, report.before, report.after
    );
    println!(
        "hits={} misses={} steals={} reads={} writes={}",
        stats.hits, stats.misses, stats.steals, stats.reads, stats.writes
    );

    Ok(())
}

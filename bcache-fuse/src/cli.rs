use std::path::PathBuf;

use bcache::{NBUF, NSHARD, Policy};
use clap::{Parser, ValueEnum};

#[derive(Parser)]
pub struct Cli {
    /// Disk image backing the cache, created if missing
    #[arg(long, short)]
    pub image: PathBuf,

    /// Number of blocks in the image
    #[arg(long, short, default_value_t = 64)]
    pub blocks: u32,

    /// Cache slots
    #[arg(long, default_value_t = NBUF)]
    pub nbuf: usize,

    /// Cache shards
    #[arg(long, default_value_t = NSHARD)]
    pub nshard: usize,

    /// Eviction policy
    #[arg(long, value_enum, default_value_t = PolicyArg::Approximate)]
    pub policy: PolicyArg,

    /// Worker threads
    #[arg(long, short, default_value_t = 4)]
    pub threads: usize,

    /// Read-modify-write rounds per worker
    #[arg(long, short, default_value_t = 1000)]
    pub rounds: usize,

    /// Seed of the per-worker block choice
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Approximate,
    Strict,
}

impl From<PolicyArg> for Policy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Approximate => Policy::Approximate,
            PolicyArg::Strict => Policy::Strict,
        }
    }
}

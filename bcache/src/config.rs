//! 缓存的常量与配置

use core::fmt;

use crate::Policy;

/// 块大小，也是一次设备传输的字节数
pub const BLOCK_SIZE: usize = 1024;
/// 缓存槽位数的默认值
pub const NBUF: usize = 30;
/// 分片数的默认值，取素数使块号分布更均匀
pub const NSHARD: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub nbuf: usize,
    pub nshard: usize,
    pub policy: Policy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    NoBuffers,
    NoShards,
    /// 分片比槽位还多，初始化时有分片分不到槽位
    TooManyShards { nbuf: usize, nshard: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            nshard: NSHARD,
            policy: Policy::default(),
        }
    }
}

impl Config {
    pub const fn new(nbuf: usize, nshard: usize) -> Self {
        Self {
            nbuf,
            nshard,
            policy: Policy::Approximate,
        }
    }

    pub const fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nbuf == 0 {
            return Err(ConfigError::NoBuffers);
        }
        if self.nshard == 0 {
            return Err(ConfigError::NoShards);
        }
        if self.nshard > self.nbuf {
            return Err(ConfigError::TooManyShards {
                nbuf: self.nbuf,
                nshard: self.nshard,
            });
        }

        Ok(())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBuffers => write!(f, "buffer pool must hold at least one slot"),
            Self::NoShards => write!(f, "shard table must hold at least one shard"),
            Self::TooManyShards { nbuf, nshard } => {
                write!(f, "{nshard} shards cannot share {nbuf} slots")
            }
        }
    }
}

impl core::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(Ok(()), Config::default().validate());
    }

    #[test]
    fn rejects_degenerate_sizes() {
        assert_eq!(Err(ConfigError::NoBuffers), Config::new(0, 1).validate());
        assert_eq!(Err(ConfigError::NoShards), Config::new(4, 0).validate());
        assert_eq!(
            Err(ConfigError::TooManyShards { nbuf: 2, nshard: 3 }),
            Config::new(2, 3).validate()
        );
    }
}

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ConfError;
use crate::replication::fast_quorum;
use crate::replication::quorum;
use crate::ReplicaId;

fn default_num_threads() -> usize {
    4
}

fn default_conflict_pool() -> usize {
    10
}

fn default_recovery_timeout_ms() -> u64 {
    300
}

fn default_tick_ms() -> u64 {
    20
}

fn default_gc_batch() -> usize {
    16
}

/// Config is the process-wide setting of a cluster. It is loaded once at startup and then shared
/// read-only, usually as an `Arc<Config>`.
///
/// ```yaml
/// replicas:
///     0: 127.0.0.1:4441
///     1: 127.0.0.1:4442
///     2: 127.0.0.1:4443
/// num_threads: 4
/// recovery_timeout_ms: 300
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Replica index to its address label. The number of entries is the replica-set size.
    pub replicas: BTreeMap<ReplicaId, String>,

    /// Number of delivery workers per replica.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Size of the contended key range used by workload generators.
    #[serde(default = "default_conflict_pool")]
    pub conflict_pool: usize,

    /// A pending request without progress for this long is recovered.
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Number of executed requests to accumulate before a Collect is broadcast.
    #[serde(default = "default_gc_batch")]
    pub gc_batch: usize,

    /// Overrides the number of fast replies that decides a fast round.
    #[serde(default)]
    pub fast_quorum: Option<usize>,
}

impl Config {
    /// new builds a config of `n` in-process replicas with default settings.
    pub fn new(n: usize) -> Config {
        Config {
            replicas: (0..n).map(|i| (i, format!("replica-{}", i))).collect(),
            num_threads: default_num_threads(),
            conflict_pool: default_conflict_pool(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            tick_ms: default_tick_ms(),
            gc_batch: default_gc_batch(),
            fast_quorum: None,
        }
    }

    /// from_file read config yaml from a local file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfError> {
        let content = fs::read_to_string(path)?;
        content.parse()
    }

    /// check verifies replica indexes are `0..n` and numeric settings are usable.
    pub fn check(&self) -> Result<(), ConfError> {
        let n = self.replicas.len();
        if n == 0 {
            return Err(ConfError::NoReplica);
        }

        for rid in 0..n {
            if !self.replicas.contains_key(&rid) {
                return Err(ConfError::MissingReplica(rid, n));
            }
        }

        if self.num_threads == 0 {
            return Err(ConfError::BadValue("num_threads", 0));
        }
        if self.gc_batch == 0 {
            return Err(ConfError::BadValue("gc_batch", 0));
        }
        if self.tick_ms == 0 {
            return Err(ConfError::BadValue("tick_ms", 0));
        }
        // Two fast quorums and a majority must share a replica, or a recovery can not tell which
        // value a fast quorum accepted.
        if let Some(fq) = self.fast_quorum {
            if fq < self.quorum() || 2 * fq + self.quorum() <= 2 * n {
                return Err(ConfError::BadValue("fast_quorum", fq));
            }
        }

        Ok(())
    }

    pub fn n_replicas(&self) -> usize {
        self.replicas.len()
    }

    pub fn quorum(&self) -> usize {
        quorum(self.n_replicas())
    }

    pub fn fast_quorum(&self) -> usize {
        self.fast_quorum
            .unwrap_or_else(|| fast_quorum(self.n_replicas()))
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl FromStr for Config {
    type Err = ConfError;

    fn from_str(s: &str) -> Result<Config, ConfError> {
        let conf: Config = serde_yaml::from_str(s)?;
        conf.check()?;
        Ok(conf)
    }
}

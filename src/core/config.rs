/*!
 * Kernel Configuration
 *
 * Runtime configuration for the process table: identifier range, table size,
 * reclamation contract and exit wake-up strategy.
 */

use super::errors::ConfigError;
use super::limits::{ARG_MAX, DEFAULT_MAX_PROCESSES, KERNEL_PID, PATH_MAX, PID_MAX, PID_MIN};
use super::types::Pid;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// When lifecycle nodes (and their ids) are reclaimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimPolicy {
    /// Nodes live until the process population drains to zero, then the
    /// whole tree is destroyed and the monotonic id counter is reset.
    /// Exit statuses stay readable until the drain.
    DrainReset,
    /// Each node is freed as soon as it has exited and is either unwatched
    /// or its status has been consumed by its parent. Ids are recycled
    /// individually through a free list.
    PerNode,
}

/// How a waiting parent is woken when a child exits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeStrategy {
    /// One condition signal shared by every node; every exit broadcasts and
    /// every waiter re-checks its own node
    Shared,
    /// One condition signal per table slot; point-to-point wake-up at the
    /// cost of one signal object per slot
    PerNode,
}

impl FromStr for ReclaimPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "drain_reset" | "drain" => Ok(Self::DrainReset),
            "per_node" | "node" => Ok(Self::PerNode),
            other => Err(ConfigError::InvalidValue {
                key: "reclaim",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for WakeStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "shared" | "broadcast" => Ok(Self::Shared),
            "per_node" | "node" => Ok(Self::PerNode),
            other => Err(ConfigError::InvalidValue {
                key: "wake",
                value: other.to_string(),
            }),
        }
    }
}

/// Process table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct KernelConfig {
    /// Lowest allocatable process id
    pub pid_min: Pid,
    /// Highest allocatable process id
    pub pid_max: Pid,
    /// Maximum number of live lifecycle nodes (kernel root excluded)
    pub max_processes: usize,
    pub reclaim: ReclaimPolicy,
    pub wake: WakeStrategy,
    /// Longest path accepted by execv
    pub path_max: usize,
    /// Total argument bytes accepted by execv
    pub arg_max: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            pid_min: PID_MIN,
            pid_max: PID_MAX,
            max_processes: DEFAULT_MAX_PROCESSES,
            reclaim: ReclaimPolicy::PerNode,
            wake: WakeStrategy::PerNode,
            path_max: PATH_MAX,
            arg_max: ARG_MAX,
        }
    }
}

impl KernelConfig {
    /// Configuration matching the drain-and-reset variant with a shared signal
    pub fn drain_reset() -> Self {
        Self {
            reclaim: ReclaimPolicy::DrainReset,
            wake: WakeStrategy::Shared,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_reclaim(mut self, reclaim: ReclaimPolicy) -> Self {
        self.reclaim = reclaim;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_wake(mut self, wake: WakeStrategy) -> Self {
        self.wake = wake;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_pid_range(mut self, min: Pid, max: Pid) -> Self {
        self.pid_min = min;
        self.pid_max = max;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.max_processes = max;
        self
    }

    /// Number of ids in the allocatable range
    #[inline]
    #[must_use]
    pub fn pid_range_len(&self) -> usize {
        if self.pid_max < self.pid_min {
            0
        } else {
            (self.pid_max - self.pid_min) as usize + 1
        }
    }

    /// Load configuration from a JSON file; missing keys take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the environment
    ///
    /// Environment variables:
    /// - KERNEL_CONFIG: JSON file to start from (default: built-in defaults)
    /// - KERNEL_RECLAIM_POLICY: `drain_reset` or `per_node`
    /// - KERNEL_WAKE_STRATEGY: `shared` or `per_node`
    /// - KERNEL_MAX_PROCESSES: process-table size
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("KERNEL_CONFIG") {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(value) = std::env::var("KERNEL_RECLAIM_POLICY") {
            config.reclaim = value.parse()?;
        }
        if let Ok(value) = std::env::var("KERNEL_WAKE_STRATEGY") {
            config.wake = value.parse()?;
        }
        if let Ok(value) = std::env::var("KERNEL_MAX_PROCESSES") {
            config.max_processes = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "max_processes",
                value,
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pid_min <= KERNEL_PID {
            return Err(ConfigError::ReservedPid {
                pid_min: self.pid_min,
                reserved: KERNEL_PID,
            });
        }
        if self.pid_range_len() == 0 {
            return Err(ConfigError::EmptyPidRange {
                min: self.pid_min,
                max: self.pid_max,
            });
        }
        if self.max_processes == 0 || self.max_processes > self.pid_range_len() {
            return Err(ConfigError::TableSize {
                max_processes: self.max_processes,
                range: self.pid_range_len(),
            });
        }
        if self.path_max == 0 || self.arg_max == 0 {
            return Err(ConfigError::InvalidValue {
                key: "path_max/arg_max",
                value: format!("{}/{}", self.path_max, self.arg_max),
            });
        }
        Ok(())
    }
}

/*!
 * Process Types
 * Common types for the process table
 */

use crate::core::config::{ReclaimPolicy, WakeStrategy};
use crate::core::types::{ExitCode, Pid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process table operation result
pub type ProcResult<T> = Result<T, ProcError>;

/// Process table errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcError {
    #[error("Process id range {min}..={max} exhausted")]
    PidsExhausted { min: Pid, max: Pid },

    #[error("Process table full: {capacity} entries")]
    TableFull { capacity: usize },

    #[error("No such child: {0}")]
    NoSuchChild(Pid),
}

/// Reference to a lifecycle node in the table
///
/// Carries the slot generation so a handle to a reclaimed node can never
/// observe the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
    pub(crate) pid: Pid,
}

impl NodeHandle {
    /// Process id held by the node
    #[inline(always)]
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }
}

/// Lifecycle state of a node; `Running -> Exited` is one-way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "code")]
pub enum NodeState {
    Running,
    Exited(ExitCode),
}

impl NodeState {
    #[inline(always)]
    #[must_use]
    pub const fn is_exited(&self) -> bool {
        matches!(self, NodeState::Exited(_))
    }

    #[inline]
    #[must_use]
    pub const fn exit_code(&self) -> Option<ExitCode> {
        match self {
            NodeState::Exited(code) => Some(*code),
            NodeState::Running => None,
        }
    }
}

/// Point-in-time view of a lifecycle node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeSnapshot {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub state: NodeState,
    pub watched: bool,
    pub children: Vec<Pid>,
}

/// Process table statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableStats {
    /// User processes whose control block still exists
    pub live_processes: usize,
    /// Lifecycle nodes held by the table, kernel root excluded
    pub live_nodes: usize,
    /// Times the user population drained to zero
    pub drains: u64,
    pub reclaim: ReclaimPolicy,
    pub wake: WakeStrategy,
}

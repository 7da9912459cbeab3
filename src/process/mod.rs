/*!
 * Process Module
 * Process identity, the relationship tree and the exit/wait rendezvous
 */

pub mod pcb;
pub mod pid;
pub(crate) mod signal;
pub mod table;
pub(crate) mod tree;
pub mod types;

// Re-export for convenience
pub use pcb::Process;
pub use pid::{MonotonicPids, PidAllocator, RecyclingPids};
pub use table::ProcTable;
pub use types::{NodeHandle, NodeSnapshot, NodeState, ProcError, ProcResult, TableStats};

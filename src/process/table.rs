/*!
 * Process Table
 *
 * The relationship tree, the id allocator and the live-process count behind
 * one mutex, plus the condition signals of the exit/wait rendezvous.
 *
 * # Locking
 *
 * Every operation here takes the table lock for an O(children) critical
 * section at most. Address-space work never happens under it. `wait_exit`
 * and `wait_for_drain` are the only blocking calls; both release the lock
 * while blocked.
 *
 * # Reclamation
 *
 * - `DrainReset`: nodes are kept until the user population reaches zero, then
 *   everything below the kernel root is destroyed and the id counter reset in
 *   the same critical section. Exit statuses can be read repeatedly until then.
 * - `PerNode`: a node is freed as soon as it has exited and is either
 *   unwatched or its status was consumed; its id goes back to the free list.
 *   Running children of a freed node become parentless and unwatched.
 */

use super::pid::{MonotonicPids, PidAllocator, RecyclingPids};
use super::signal::ExitSignals;
use super::tree::NodeArena;
use super::types::{NodeHandle, NodeSnapshot, NodeState, ProcError, ProcResult, TableStats};
use crate::core::config::{KernelConfig, ReclaimPolicy};
use crate::core::limits::KERNEL_PID;
use crate::core::types::{ExitCode, Pid};
use crate::kernel_panic;
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

struct TableState {
    arena: NodeArena,
    pids: Box<dyn PidAllocator>,
    root: usize,
    live_processes: usize,
    /// Created processes that have not exited yet
    running: usize,
    drains: u64,
}

impl TableState {
    /// Resolve a handle the caller knows to be live
    fn expect_live(&self, node: NodeHandle) -> usize {
        match self.arena.resolve(node) {
            Some(slot) => slot,
            None => kernel_panic!("lifecycle node for PID {} used after free", node.pid),
        }
    }

    /// Free `slot` if it has exited and nobody will wait on it any more
    ///
    /// Appends every freed slot to `freed` so the caller can wake waiters.
    fn reclaim_if_done(&mut self, slot: usize, freed: &mut Vec<usize>) {
        let node = self.arena.expect(slot);
        if !node.state.is_exited() || (node.watched && !node.consumed) {
            return;
        }

        // An exited node already flagged its children unwatched
        let orphans = self.arena.detach_children(slot);
        self.arena.unlink(slot);
        let node = self.arena.remove(slot);
        self.pids.release(node.pid);
        freed.push(slot);
        debug!("Reclaimed lifecycle node for PID {}", node.pid);

        for orphan in orphans {
            self.reclaim_if_done(orphan, freed);
        }
    }
}

/// Process table
pub struct ProcTable {
    state: Mutex<TableState>,
    exits: ExitSignals,
    drained: Condvar,
    reclaim: ReclaimPolicy,
    max_processes: usize,
}

impl ProcTable {
    /// Create a table holding only the kernel root
    pub fn new(config: &KernelConfig) -> Self {
        // Exited nodes can outlive their process, so the arena is bounded by
        // the ids that can be held at once, plus the kernel root
        let mut arena = NodeArena::with_capacity(config.pid_range_len() + 1);
        let root = match arena.insert(KERNEL_PID) {
            Ok(handle) => handle.slot as usize,
            Err(e) => kernel_panic!("cannot create the kernel root node: {}", e),
        };

        let pids: Box<dyn PidAllocator> = match config.reclaim {
            ReclaimPolicy::DrainReset => {
                Box::new(MonotonicPids::new(config.pid_min, config.pid_max))
            }
            ReclaimPolicy::PerNode => Box::new(RecyclingPids::new(config.pid_min, config.pid_max)),
        };

        info!(
            "Process table initialized: {} running max, {} pids {}..={}, {:?} reclaim, {:?} wake",
            config.max_processes,
            pids.name(),
            config.pid_min,
            config.pid_max,
            config.reclaim,
            config.wake
        );

        Self {
            state: Mutex::new(TableState {
                arena,
                pids,
                root,
                live_processes: 0,
                running: 0,
                drains: 0,
            }),
            exits: ExitSignals::new(config.wake, config.max_processes + 1),
            drained: Condvar::new(),
            reclaim: config.reclaim,
            max_processes: config.max_processes,
        }
    }

    /// Handle to the kernel root node
    pub fn root(&self) -> NodeHandle {
        let state = self.state.lock();
        state.arena.handle(state.root)
    }

    #[inline]
    pub fn reclaim_policy(&self) -> ReclaimPolicy {
        self.reclaim
    }

    /// Allocate an id and an unlinked node for a new process
    ///
    /// Counts the process as live until `process_destroyed`. At most
    /// `max_processes` created processes may be running at once; exited
    /// nodes kept for their parent or for the drain do not count.
    pub fn create_node(&self) -> ProcResult<NodeHandle> {
        let mut state = self.state.lock();
        if state.running >= self.max_processes {
            return Err(ProcError::TableFull {
                capacity: self.max_processes,
            });
        }
        let pid = state.pids.allocate()?;
        let handle = match state.arena.insert(pid) {
            Ok(handle) => handle,
            Err(e) => {
                state.pids.release(pid);
                return Err(e);
            }
        };
        state.live_processes += 1;
        state.running += 1;
        debug!(
            "Created lifecycle node for PID {} ({} live)",
            pid, state.live_processes
        );
        Ok(handle)
    }

    /// Link `child` under `parent`; the child becomes watched
    pub fn add_child(&self, parent: NodeHandle, child: NodeHandle) {
        let mut state = self.state.lock();
        let parent_slot = state.expect_live(parent);
        let child_slot = state.expect_live(child);
        state.arena.add_child(parent_slot, child_slot);
        debug!("Linked PID {} under PID {}", child.pid, parent.pid);
    }

    /// Set whether an ancestor still intends to wait on `node`
    pub fn set_watched(&self, node: NodeHandle, watched: bool) {
        let mut state = self.state.lock();
        let Some(slot) = state.arena.resolve(node) else {
            return;
        };
        state.arena.expect_mut(slot).watched = watched;

        if !watched && self.reclaim == ReclaimPolicy::PerNode {
            let mut freed = Vec::new();
            state.reclaim_if_done(slot, &mut freed);
            self.wake(&freed);
        }
    }

    /// Find a direct child of `parent` by pid
    pub fn find_child(&self, parent: NodeHandle, pid: Pid) -> Option<NodeHandle> {
        let state = self.state.lock();
        let parent_slot = state.arena.resolve(parent)?;
        state
            .arena
            .find_child(parent_slot, pid)
            .map(|slot| state.arena.handle(slot))
    }

    /// Record `code` as the exit status of `node` and wake its waiter
    ///
    /// Also flags every direct child as unwatched: the exiting process can
    /// no longer wait on them.
    pub fn publish_exit(&self, node: NodeHandle, code: ExitCode) {
        let mut state = self.state.lock();
        let slot = state.expect_live(node);

        let entry = state.arena.expect_mut(slot);
        if entry.state.is_exited() {
            kernel_panic!("PID {} exited twice", node.pid);
        }
        entry.state = NodeState::Exited(code);
        state.running -= 1;
        state.arena.mark_not_watched_for_all_children(slot);

        let mut woken = vec![slot];
        if self.reclaim == ReclaimPolicy::PerNode {
            let children: Vec<usize> = state.arena.children(slot).collect();
            for child in children {
                state.reclaim_if_done(child, &mut woken);
            }
            state.reclaim_if_done(slot, &mut woken);
        }
        debug!("PID {} exited with code {}", node.pid, code);

        self.wake(&woken);
    }

    /// Block until `node` has exited and return its code
    ///
    /// Fails with `NoSuchChild` if the node is (or becomes) reclaimed before
    /// an exit can be observed through this handle.
    pub fn wait_exit(&self, node: NodeHandle) -> ProcResult<ExitCode> {
        let mut state = self.state.lock();
        loop {
            let Some(slot) = state.arena.resolve(node) else {
                return Err(ProcError::NoSuchChild(node.pid));
            };
            if let Some(code) = state.arena.expect(slot).exit_code() {
                return Ok(code);
            }
            self.exits.wait(slot, &mut state);
        }
    }

    /// Exit code of `node` if it has already exited; never blocks
    pub fn exit_code(&self, node: NodeHandle) -> Option<ExitCode> {
        let state = self.state.lock();
        let slot = state.arena.resolve(node)?;
        state.arena.expect(slot).exit_code()
    }

    /// Mark the exit status of `node` as delivered to its parent
    pub fn consume(&self, node: NodeHandle) {
        let mut state = self.state.lock();
        let Some(slot) = state.arena.resolve(node) else {
            return;
        };
        state.arena.expect_mut(slot).consumed = true;

        if self.reclaim == ReclaimPolicy::PerNode {
            let mut freed = Vec::new();
            state.reclaim_if_done(slot, &mut freed);
            self.wake(&freed);
        }
    }

    /// Free the node of a process that never started running
    ///
    /// Rollback path for a failed fork: unlinks the node from its parent and
    /// returns its id, whatever the reclamation policy.
    pub fn abandon(&self, node: NodeHandle) {
        let mut state = self.state.lock();
        let slot = state.expect_live(node);
        let entry = state.arena.expect(slot);
        if entry.state.is_exited() || entry.first_child.is_some() {
            kernel_panic!("abandoning PID {} which has already run", node.pid);
        }

        state.arena.unlink(slot);
        let entry = state.arena.remove(slot);
        state.pids.release(entry.pid);
        state.running -= 1;
        debug!("Abandoned lifecycle node for PID {}", entry.pid);
        self.wake(&[slot]);
    }

    /// Account for a destroyed process control block
    ///
    /// When the last user process goes, wakes `wait_for_drain` and, under
    /// `DrainReset`, tears down the whole tree below the root.
    pub fn process_destroyed(&self) {
        let mut state = self.state.lock();
        if state.live_processes == 0 {
            kernel_panic!("process count underflow");
        }
        state.live_processes -= 1;
        if state.live_processes > 0 {
            return;
        }

        match self.reclaim {
            ReclaimPolicy::DrainReset => {
                let root = state.root;
                let head = state.arena.expect_mut(root).first_child.take();
                let destroyed = match head {
                    Some(head) => state.arena.destroy_subtree(head).len(),
                    None => 0,
                };
                state.pids.reset();
                debug!("Destroyed {} lifecycle nodes and reset pids", destroyed);
            }
            ReclaimPolicy::PerNode => {
                let leaked = state.arena.live() - 1;
                if leaked > 0 {
                    warn!(
                        "{} lifecycle nodes outlived the last process: {:?}",
                        leaked,
                        state.arena.live_pids()
                    );
                }
            }
        }

        state.drains += 1;
        info!("Process population drained (drain #{})", state.drains);
        self.drained.notify_all();
    }

    /// Block until no user process is left
    pub fn wait_for_drain(&self) {
        let mut state = self.state.lock();
        while state.live_processes > 0 {
            self.drained.wait(&mut state);
        }
    }

    /// Diagnostic view of the node currently holding `pid`
    pub fn snapshot(&self, pid: Pid) -> Option<NodeSnapshot> {
        let state = self.state.lock();
        let slot = state.arena.find_pid(pid)?;
        Some(state.arena.snapshot(slot))
    }

    /// Pids held by live nodes, kernel root excluded
    pub fn live_pids(&self) -> Vec<Pid> {
        let state = self.state.lock();
        state
            .arena
            .live_pids()
            .into_iter()
            .filter(|&pid| pid != KERNEL_PID)
            .collect()
    }

    pub fn stats(&self) -> TableStats {
        let state = self.state.lock();
        TableStats {
            live_processes: state.live_processes,
            live_nodes: state.arena.live() - 1,
            drains: state.drains,
            reclaim: self.reclaim,
            wake: self.exits.strategy(),
        }
    }

    fn wake(&self, slots: &[usize]) {
        match self.exits.strategy() {
            crate::core::config::WakeStrategy::Shared => {
                if !slots.is_empty() {
                    self.exits.wake(0);
                }
            }
            crate::core::config::WakeStrategy::PerNode => {
                for &slot in slots {
                    self.exits.wake(slot);
                }
            }
        }
    }
}

/*!
 * Relationship Tree
 *
 * Lifecycle nodes stored in an index-addressed arena. Parent/child links are
 * first-child / next-sibling slot indices, so a node is owned by exactly one
 * parent list and there are no owning pointers to form cycles.
 *
 * Every slot carries a generation that is bumped when the node is freed;
 * handles compare it before touching the slot.
 *
 * Not synchronized: the process table owns the arena behind its lock.
 */

use super::types::{NodeHandle, NodeSnapshot, NodeState, ProcError, ProcResult};
use crate::core::types::{ExitCode, Pid};
use crate::kernel_panic;

/// One lifecycle record per process
#[derive(Debug)]
pub(crate) struct LifecycleNode {
    pub pid: Pid,
    pub state: NodeState,
    /// Some ancestor still intends to wait on this node
    pub watched: bool,
    /// The exit status has been delivered to the waiting parent
    pub consumed: bool,
    pub parent: Option<usize>,
    pub first_child: Option<usize>,
    pub next_sibling: Option<usize>,
}

impl LifecycleNode {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            state: NodeState::Running,
            watched: false,
            consumed: false,
            parent: None,
            first_child: None,
            next_sibling: None,
        }
    }

    #[inline]
    pub fn exit_code(&self) -> Option<ExitCode> {
        self.state.exit_code()
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<LifecycleNode>,
}

/// Arena of lifecycle nodes
pub(crate) struct NodeArena {
    slots: Vec<Slot>,
    free_slots: Vec<usize>,
    capacity: usize,
    live: usize,
}

impl NodeArena {
    /// Create an arena holding at most `capacity` nodes
    ///
    /// Slots are allocated on demand, so a large bound costs nothing up front.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            capacity,
            live: 0,
        }
    }

    /// Number of nodes currently held
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    /// Store a fresh, unlinked node for `pid`
    pub fn insert(&mut self, pid: Pid) -> ProcResult<NodeHandle> {
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None if self.slots.len() < self.capacity => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
            None => {
                return Err(ProcError::TableFull {
                    capacity: self.capacity,
                })
            }
        };

        let entry = &mut self.slots[slot];
        entry.node = Some(LifecycleNode::new(pid));
        self.live += 1;

        Ok(NodeHandle {
            slot: slot as u32,
            generation: entry.generation,
            pid,
        })
    }

    /// Free a node, invalidating every handle to it
    ///
    /// The node must already be unlinked from its parent and children.
    pub fn remove(&mut self, slot: usize) -> LifecycleNode {
        let entry = match self.slots.get_mut(slot) {
            Some(entry) => entry,
            None => kernel_panic!("freeing slot {} outside the arena", slot),
        };
        let node = match entry.node.take() {
            Some(node) => node,
            None => kernel_panic!("double free of lifecycle slot {}", slot),
        };
        entry.generation = entry.generation.wrapping_add(1);
        self.free_slots.push(slot);
        self.live -= 1;
        node
    }

    /// Resolve a handle, failing if its node has been freed
    #[inline]
    pub fn resolve(&self, handle: NodeHandle) -> Option<usize> {
        let slot = handle.slot as usize;
        let entry = self.slots.get(slot)?;
        (entry.generation == handle.generation && entry.node.is_some()).then_some(slot)
    }

    #[inline]
    pub fn node(&self, slot: usize) -> Option<&LifecycleNode> {
        self.slots.get(slot).and_then(|entry| entry.node.as_ref())
    }

    #[inline]
    pub fn node_mut(&mut self, slot: usize) -> Option<&mut LifecycleNode> {
        self.slots.get_mut(slot).and_then(|entry| entry.node.as_mut())
    }

    /// Like `node`, for slots the caller has already resolved
    #[inline]
    pub fn expect(&self, slot: usize) -> &LifecycleNode {
        match self.node(slot) {
            Some(node) => node,
            None => kernel_panic!("dangling lifecycle link to slot {}", slot),
        }
    }

    #[inline]
    pub fn expect_mut(&mut self, slot: usize) -> &mut LifecycleNode {
        match self.node_mut(slot) {
            Some(node) => node,
            None => kernel_panic!("dangling lifecycle link to slot {}", slot),
        }
    }

    /// Handle for an occupied slot
    pub fn handle(&self, slot: usize) -> NodeHandle {
        let node = self.expect(slot);
        NodeHandle {
            slot: slot as u32,
            generation: self.slots[slot].generation,
            pid: node.pid,
        }
    }

    /// Iterate the direct children of `parent`, newest first
    pub fn children(&self, parent: usize) -> Children<'_> {
        Children {
            arena: self,
            next: self.expect(parent).first_child,
        }
    }

    /// Link `child` as the new head of `parent`'s child list
    ///
    /// O(1). The child becomes watched by the parent.
    pub fn add_child(&mut self, parent: usize, child: usize) {
        if parent == child {
            kernel_panic!("node {} linked as its own child", self.expect(parent).pid);
        }
        if let Some(existing) = self.expect(child).parent {
            kernel_panic!(
                "node {} already has parent {}",
                self.expect(child).pid,
                self.expect(existing).pid
            );
        }

        let old_head = self.expect_mut(parent).first_child.replace(child);
        let node = self.expect_mut(child);
        node.next_sibling = old_head;
        node.parent = Some(parent);
        node.watched = true;
    }

    /// Find a direct child of `parent` by pid
    ///
    /// Only direct children are visible; grandchildren, siblings and unknown
    /// ids are all "not found".
    pub fn find_child(&self, parent: usize, pid: Pid) -> Option<usize> {
        self.children(parent)
            .find(|&slot| self.expect(slot).pid == pid)
    }

    /// Flag every direct child as no longer waited on
    pub fn mark_not_watched_for_all_children(&mut self, parent: usize) {
        let mut next = self.expect(parent).first_child;
        while let Some(slot) = next {
            let node = self.expect_mut(slot);
            node.watched = false;
            next = node.next_sibling;
        }
    }

    /// Remove `child` from its parent's list; O(siblings)
    pub fn unlink(&mut self, child: usize) {
        let Some(parent) = self.expect(child).parent else {
            return;
        };
        let after = self.expect(child).next_sibling;

        if self.expect(parent).first_child == Some(child) {
            self.expect_mut(parent).first_child = after;
        } else {
            let mut cursor = self.expect(parent).first_child;
            loop {
                let Some(slot) = cursor else {
                    kernel_panic!(
                        "node {} missing from the child list of {}",
                        self.expect(child).pid,
                        self.expect(parent).pid
                    );
                };
                let next = self.expect(slot).next_sibling;
                if next == Some(child) {
                    self.expect_mut(slot).next_sibling = after;
                    break;
                }
                cursor = next;
            }
        }

        let node = self.expect_mut(child);
        node.parent = None;
        node.next_sibling = None;
    }

    /// Cut every child loose from `parent`, returning their slots
    pub fn detach_children(&mut self, parent: usize) -> Vec<usize> {
        let mut detached = Vec::new();
        let mut next = self.expect_mut(parent).first_child.take();
        while let Some(slot) = next {
            let node = self.expect_mut(slot);
            next = node.next_sibling.take();
            node.parent = None;
            detached.push(slot);
        }
        detached
    }

    /// Free every node reachable from `head` through child and sibling links
    ///
    /// Descendants are freed before their ancestors. Only safe when no
    /// execution context can still reach any of these nodes. Returns the pids
    /// released.
    pub fn destroy_subtree(&mut self, head: usize) -> Vec<Pid> {
        let mut order = Vec::new();
        let mut stack = vec![head];
        while let Some(slot) = stack.pop() {
            let node = self.expect(slot);
            if let Some(sibling) = node.next_sibling {
                stack.push(sibling);
            }
            if let Some(child) = node.first_child {
                stack.push(child);
            }
            order.push(slot);
        }

        // A node is always visited after its parent, so reverse order frees
        // children first
        order
            .into_iter()
            .rev()
            .map(|slot| {
                let node = self.remove(slot);
                node.pid
            })
            .collect()
    }

    /// Find a live node by pid; O(table)
    pub fn find_pid(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|entry| entry.node.as_ref().is_some_and(|node| node.pid == pid))
    }

    /// Pids of every live node
    pub fn live_pids(&self) -> Vec<Pid> {
        self.slots
            .iter()
            .filter_map(|entry| entry.node.as_ref().map(|node| node.pid))
            .collect()
    }

    pub fn snapshot(&self, slot: usize) -> NodeSnapshot {
        let node = self.expect(slot);
        NodeSnapshot {
            pid: node.pid,
            parent: node.parent.map(|parent| self.expect(parent).pid),
            state: node.state,
            watched: node.watched,
            children: self
                .children(slot)
                .map(|child| self.expect(child).pid)
                .collect(),
        }
    }
}

/// Iterator over a node's direct children
pub(crate) struct Children<'a> {
    arena: &'a NodeArena,
    next: Option<usize>,
}

impl Iterator for Children<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let slot = self.next?;
        self.next = self.arena.expect(slot).next_sibling;
        Some(slot)
    }
}

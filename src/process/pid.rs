/*!
 * Process ID Allocation
 *
 * Two allocation policies, each paired with one reclamation contract:
 * - Monotonic: one counter, reset only when the whole population drains
 * - Recycling: counter plus a FIFO free list fed by explicit release
 *
 * Allocators live inside the process table state and are only touched with
 * the table lock held, so they mutate through `&mut self` rather than atomics.
 */

use super::types::{ProcError, ProcResult};
use crate::core::types::Pid;
use std::collections::VecDeque;

/// Process id allocator interface
pub trait PidAllocator: Send {
    /// Hand out an id not held by any live node
    fn allocate(&mut self) -> ProcResult<Pid>;

    /// Return an id whose node has been reclaimed
    fn release(&mut self, pid: Pid);

    /// Forget every issued id; only valid once no node holds one
    fn reset(&mut self);

    /// Allocator name (for logging)
    fn name(&self) -> &'static str;
}

/// Next fresh id of a counter, `None` once the counter has run past `Pid::MAX`
type Cursor = Option<Pid>;

/// Take the fresh id under `cursor` if it is still within `max`
#[inline]
fn take_fresh(cursor: &mut Cursor, max: Pid) -> Option<Pid> {
    let pid = cursor.filter(|&pid| pid <= max)?;
    *cursor = pid.checked_add(1);
    Some(pid)
}

/// Monotonic counter, reset on drain
pub struct MonotonicPids {
    min: Pid,
    max: Pid,
    next: Cursor,
}

impl MonotonicPids {
    pub fn new(min: Pid, max: Pid) -> Self {
        Self {
            min,
            max,
            next: Some(min),
        }
    }
}

impl PidAllocator for MonotonicPids {
    fn allocate(&mut self) -> ProcResult<Pid> {
        take_fresh(&mut self.next, self.max).ok_or(ProcError::PidsExhausted {
            min: self.min,
            max: self.max,
        })
    }

    #[inline]
    fn release(&mut self, _pid: Pid) {
        // Ids come back only through reset()
    }

    fn reset(&mut self) {
        self.next = Some(self.min);
    }

    fn name(&self) -> &'static str {
        "monotonic"
    }
}

/// Counter with per-id recycling
///
/// Released ids are reused oldest-first, which delays reuse of any single
/// id for as long as the free list allows.
pub struct RecyclingPids {
    min: Pid,
    max: Pid,
    next: Cursor,
    free_list: VecDeque<Pid>,
}

impl RecyclingPids {
    pub fn new(min: Pid, max: Pid) -> Self {
        Self {
            min,
            max,
            next: Some(min),
            free_list: VecDeque::new(),
        }
    }
}

impl PidAllocator for RecyclingPids {
    fn allocate(&mut self) -> ProcResult<Pid> {
        if let Some(pid) = take_fresh(&mut self.next, self.max) {
            return Ok(pid);
        }
        self.free_list.pop_front().ok_or(ProcError::PidsExhausted {
            min: self.min,
            max: self.max,
        })
    }

    fn release(&mut self, pid: Pid) {
        debug_assert!(pid >= self.min && self.next.map_or(true, |next| pid < next));
        debug_assert!(!self.free_list.contains(&pid));
        self.free_list.push_back(pid);
    }

    fn reset(&mut self) {
        self.next = Some(self.min);
        self.free_list.clear();
    }

    fn name(&self) -> &'static str {
        "recycling"
    }
}

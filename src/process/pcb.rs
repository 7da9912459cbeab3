/*!
 * Process Control Block
 *
 * The per-process record: name, id, the lifecycle node it owns, and the
 * mutable pieces (address space, working directory, attached contexts)
 * behind a per-process lock that is never held together with the table lock.
 */

use super::types::NodeHandle;
use crate::core::types::{ContextId, Pid};
use crate::kernel_panic;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct ProcInner<S> {
    space: Option<Arc<S>>,
    cwd: Option<String>,
    threads: Vec<ContextId>,
}

/// Process control block, generic over the platform's address-space type
pub struct Process<S> {
    name: String,
    node: NodeHandle,
    inner: Mutex<ProcInner<S>>,
}

impl<S> Process<S> {
    pub fn new(name: impl Into<String>, node: NodeHandle) -> Self {
        Self {
            name: name.into(),
            node,
            inner: Mutex::new(ProcInner {
                space: None,
                cwd: None,
                threads: Vec::new(),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own process id; fixed for the life of the process
    #[inline(always)]
    pub fn pid(&self) -> Pid {
        self.node.pid()
    }

    #[inline(always)]
    pub fn node(&self) -> NodeHandle {
        self.node
    }

    /// Current address space, if any
    pub fn space(&self) -> Option<Arc<S>> {
        self.inner.lock().space.clone()
    }

    /// Install a new address space, returning the previous one
    ///
    /// The caller is responsible for activating the new space and destroying
    /// the old one.
    pub fn set_space(&self, space: Option<Arc<S>>) -> Option<Arc<S>> {
        std::mem::replace(&mut self.inner.lock().space, space)
    }

    pub fn cwd(&self) -> Option<String> {
        self.inner.lock().cwd.clone()
    }

    pub fn set_cwd(&self, cwd: Option<String>) {
        self.inner.lock().cwd = cwd;
    }

    /// Attach an execution context to this process
    pub fn add_thread(&self, context: ContextId) {
        let mut inner = self.inner.lock();
        if inner.threads.contains(&context) {
            kernel_panic!("context {} attached twice to PID {}", context, self.pid());
        }
        inner.threads.push(context);
    }

    /// Detach an execution context; it must be attached
    pub fn remove_thread(&self, context: ContextId) {
        let mut inner = self.inner.lock();
        match inner.threads.iter().position(|&c| c == context) {
            Some(index) => {
                inner.threads.swap_remove(index);
            }
            None => kernel_panic!("context {} escaped from PID {}", context, self.pid()),
        }
    }

    pub fn thread_count(&self) -> usize {
        self.inner.lock().threads.len()
    }
}

impl<S> fmt::Debug for Process<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("pid", &self.pid())
            .field("has_space", &inner.space.is_some())
            .field("cwd", &inner.cwd)
            .field("threads", &inner.threads)
            .finish()
    }
}

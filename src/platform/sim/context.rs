/*!
 * Simulated Execution Contexts
 *
 * Every context is an OS thread. Terminating a context unwinds its thread
 * with a private payload that the thread's entry wrapper swallows; any other
 * panic is recorded so tests can assert that no context died abnormally.
 */

use super::space::SimSpace;
use crate::core::errors::KernelPanic;
use crate::core::types::ContextId;
use crate::platform::{PlatformError, PlatformResult};
use log::{debug, error};
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Context id of any thread not started through `spawn`
pub const SUPERVISOR_CONTEXT: ContextId = 0;

thread_local! {
    static CURRENT: Cell<ContextId> = const { Cell::new(SUPERVISOR_CONTEXT) };
    static ACTIVE_SPACE: RefCell<Option<Arc<SimSpace>>> = const { RefCell::new(None) };
}

/// Unwind payload used to terminate a context
struct ContextExit;

pub(super) struct SimContexts {
    next_id: AtomicU64,
    handles: Mutex<Vec<JoinHandle<()>>>,
    failures: Arc<Mutex<Vec<String>>>,
    fail_spawns: AtomicUsize,
}

impl SimContexts {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(SUPERVISOR_CONTEXT + 1),
            handles: Mutex::new(Vec::new()),
            failures: Arc::new(Mutex::new(Vec::new())),
            fail_spawns: AtomicUsize::new(0),
        }
    }

    pub fn current() -> ContextId {
        CURRENT.with(Cell::get)
    }

    pub fn spawn(
        &self,
        name: &str,
        entry: Box<dyn FnOnce() + Send + 'static>,
    ) -> PlatformResult<ContextId> {
        if take_one(&self.fail_spawns) {
            return Err(PlatformError::SpawnFailed(format!("injected failure for {}", name)));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let failures = Arc::clone(&self.failures);
        let thread_name = format!("{}#{}", name, id);

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                CURRENT.with(|current| current.set(id));
                let outcome = panic::catch_unwind(AssertUnwindSafe(entry));
                ACTIVE_SPACE.with(|active| active.borrow_mut().take());

                match outcome {
                    Ok(()) => debug!("Context {} returned", thread_name),
                    Err(payload) if payload.is::<ContextExit>() => {
                        debug!("Context {} exited", thread_name)
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!("Context {} panicked: {}", thread_name, message);
                        failures.lock().push(format!("{}: {}", thread_name, message));
                    }
                }
            })
            .map_err(|e| PlatformError::SpawnFailed(e.to_string()))?;

        self.handles.lock().push(handle);
        Ok(id)
    }

    pub fn exit() -> ! {
        panic::resume_unwind(Box::new(ContextExit))
    }

    /// Whether an unwind payload is a context termination
    pub fn is_exit(payload: &(dyn std::any::Any + Send)) -> bool {
        payload.is::<ContextExit>()
    }

    pub fn activate(space: &Arc<SimSpace>) {
        ACTIVE_SPACE.with(|active| *active.borrow_mut() = Some(Arc::clone(space)));
    }

    pub fn deactivate() {
        ACTIVE_SPACE.with(|active| active.borrow_mut().take());
    }

    pub fn active_space() -> Option<Arc<SimSpace>> {
        ACTIVE_SPACE.with(|active| active.borrow().clone())
    }

    pub fn fail_next_spawns(&self, count: usize) {
        self.fail_spawns.store(count, Ordering::SeqCst);
    }

    /// Join every context started so far, including ones started while joining
    pub fn join_all(&self) -> Vec<String> {
        loop {
            let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                // Panics are caught inside the thread
                let _ = handle.join();
            }
        }
        std::mem::take(&mut *self.failures.lock())
    }
}

/// Consume one pending injected failure, if any
pub(super) fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(halt) = payload.downcast_ref::<KernelPanic>() {
        halt.to_string()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

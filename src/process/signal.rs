/*!
 * Exit Signals
 *
 * Condition signals used by the exit/wait rendezvous. All of them pair with
 * the single process-table mutex; they differ only in who gets woken.
 */

use crate::core::config::WakeStrategy;
use parking_lot::{Condvar, MutexGuard};

pub(crate) enum ExitSignals {
    /// Every exit broadcasts; waiters re-check their own node
    Shared(Condvar),
    /// One signal per table slot; slots past the end share signals modulo
    /// the length, and waiters re-check their node after every wakeup
    PerNode(Box<[Condvar]>),
}

impl ExitSignals {
    /// Build signals for `slots` concurrent waiters
    pub fn new(strategy: WakeStrategy, slots: usize) -> Self {
        match strategy {
            WakeStrategy::Shared => ExitSignals::Shared(Condvar::new()),
            WakeStrategy::PerNode => {
                ExitSignals::PerNode((0..slots).map(|_| Condvar::new()).collect())
            }
        }
    }

    /// Block until woken for `slot`; the guard is released while blocked
    /// and re-acquired before returning. Callers must re-check their state.
    pub fn wait<T>(&self, slot: usize, guard: &mut MutexGuard<'_, T>) {
        match self {
            ExitSignals::Shared(signal) => signal.wait(guard),
            ExitSignals::PerNode(signals) => signals[slot % signals.len()].wait(guard),
        }
    }

    /// Wake everyone interested in `slot`
    ///
    /// Broadcast even for a per-node signal: a parent normally has a single
    /// waiter per child, but a second concurrent wait must not be stranded.
    pub fn wake(&self, slot: usize) -> usize {
        match self {
            ExitSignals::Shared(signal) => signal.notify_all(),
            ExitSignals::PerNode(signals) => signals[slot % signals.len()].notify_all(),
        }
    }

    pub fn strategy(&self) -> WakeStrategy {
        match self {
            ExitSignals::Shared(_) => WakeStrategy::Shared,
            ExitSignals::PerNode(_) => WakeStrategy::PerNode,
        }
    }
}

/*!
 * Shared helpers for syscall scenarios
 */

use parking_lot::Mutex;
use proc_lifecycle::{Kernel, KernelConfig, ReclaimPolicy, SimPlatform, WakeStrategy};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type TestKernel = Arc<Kernel<SimPlatform>>;

/// Every reclamation/wake combination
pub const VARIANTS: [(ReclaimPolicy, WakeStrategy); 4] = [
    (ReclaimPolicy::DrainReset, WakeStrategy::Shared),
    (ReclaimPolicy::DrainReset, WakeStrategy::PerNode),
    (ReclaimPolicy::PerNode, WakeStrategy::Shared),
    (ReclaimPolicy::PerNode, WakeStrategy::PerNode),
];

pub fn boot_with(config: KernelConfig) -> (TestKernel, Arc<SimPlatform>) {
    let platform = Arc::new(SimPlatform::new());
    let kernel = Kernel::builder(Arc::clone(&platform))
        .with_config(config)
        .boot()
        .unwrap();
    (kernel, platform)
}

pub fn boot(reclaim: ReclaimPolicy, wake: WakeStrategy) -> (TestKernel, Arc<SimPlatform>) {
    boot_with(
        KernelConfig::default()
            .with_reclaim(reclaim)
            .with_wake(wake)
            .with_max_processes(32),
    )
}

/// Wait for the population to drain and check that nothing leaked or crashed
pub fn finish(kernel: &TestKernel, platform: &SimPlatform) {
    kernel.wait_for_drain();
    let failures = platform.join_contexts();
    assert!(failures.is_empty(), "context failures: {:?}", failures);

    let stats = kernel.stats();
    assert_eq!(stats.live_processes, 0);
    assert_eq!(stats.live_nodes, 0, "leaked nodes: {:?}", kernel.live_pids());
    assert_eq!(platform.live_spaces(), 0);
}

/// Poll `condition` until it holds; panics after a generous timeout
pub fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Values recorded by user programs for the test to inspect
pub struct Log<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Log<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, value: T) {
        self.0.lock().push(value);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.0.lock().clone()
    }
}

impl<T> Clone for Log<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// One-shot flag user programs can block on
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, parking_lot::Condvar)>);

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (open, signal) = &*self.0;
        *open.lock() = true;
        signal.notify_all();
    }

    pub fn wait(&self) {
        let (open, signal) = &*self.0;
        let mut guard = open.lock();
        while !*guard {
            signal.wait(&mut guard);
        }
    }

    pub fn is_open(&self) -> bool {
        *self.0 .0.lock()
    }
}

/*!
 * Kernel
 *
 * Ties the process table, the per-process control blocks and the platform
 * together: boot, process creation and destruction, context attachment, and
 * starting programs on behalf of the supervisor.
 */

use crate::core::config::{KernelConfig, ReclaimPolicy, WakeStrategy};
use crate::core::errors::KernelError;
use crate::core::limits::KERNEL_PID;
use crate::core::types::{ContextId, KernelResult, Pid};
use crate::kernel_panic;
use crate::monitoring::span_operation;
use crate::platform::{Platform, TrapFrame, TrapHandler};
use crate::process::{NodeSnapshot, ProcResult, ProcTable, Process, TableStats};
use crate::syscall::PreparedImage;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::{Arc, Weak};

/// Process control block specialised to a platform
pub type ProcessRef<P> = Arc<Process<<P as crate::platform::AddressSpaces>::Space>>;

/// Process-lifecycle kernel over a platform `P`
pub struct Kernel<P: Platform> {
    me: Weak<Kernel<P>>,
    pub(crate) platform: Arc<P>,
    pub(crate) config: KernelConfig,
    pub(crate) table: ProcTable,
    kproc: ProcessRef<P>,
    threads: DashMap<ContextId, ProcessRef<P>, RandomState>,
}

/// Builder for Kernel
pub struct KernelBuilder<P: Platform> {
    platform: Arc<P>,
    config: KernelConfig,
}

impl<P: Platform> KernelBuilder<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            config: KernelConfig::default(),
        }
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reclaim(mut self, reclaim: ReclaimPolicy) -> Self {
        self.config.reclaim = reclaim;
        self
    }

    pub fn with_wake(mut self, wake: WakeStrategy) -> Self {
        self.config.wake = wake;
        self
    }

    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.config.max_processes = max;
        self
    }

    /// Validate the configuration and boot
    pub fn boot(self) -> KernelResult<Arc<Kernel<P>>> {
        Kernel::boot(self.platform, self.config)
    }
}

impl<P: Platform> Kernel<P> {
    pub fn builder(platform: Arc<P>) -> KernelBuilder<P> {
        KernelBuilder::new(platform)
    }

    /// Boot: create the kernel process on the calling context and install
    /// the trap handler
    pub fn boot(platform: Arc<P>, config: KernelConfig) -> KernelResult<Arc<Self>> {
        config.validate()?;
        let span = span_operation("boot");
        let _entered = span.enter();

        let table = ProcTable::new(&config);
        let kproc = Arc::new(Process::new("[kernel]", table.root()));
        let context = platform.current_context();

        let kernel = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            platform,
            config,
            table,
            kproc,
            threads: DashMap::with_hasher(RandomState::new()),
        });
        kernel.attach(context, &kernel.kproc);

        let handler: Weak<dyn TrapHandler> = Arc::downgrade(&kernel) as Weak<dyn TrapHandler>;
        kernel.platform.install_trap_handler(handler);

        info!(
            "Kernel booted: kernel process PID {} on context {}",
            KERNEL_PID, context
        );
        span.record_result(true);
        Ok(kernel)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    pub fn kernel_process(&self) -> &ProcessRef<P> {
        &self.kproc
    }

    /// Strong reference to this kernel, for contexts that outlive a call
    pub(crate) fn arc(&self) -> Arc<Self> {
        match self.me.upgrade() {
            Some(kernel) => kernel,
            None => kernel_panic!("kernel used during teardown"),
        }
    }

    /// Process the calling context is attached to
    pub fn curproc(&self) -> ProcessRef<P> {
        self.process_of(self.platform.current_context())
    }

    pub(crate) fn process_of(&self, context: ContextId) -> ProcessRef<P> {
        match self.threads.get(&context) {
            Some(entry) => Arc::clone(entry.value()),
            None => kernel_panic!("context {} is attached to no process", context),
        }
    }

    /// Attach `context` to `process`
    pub(crate) fn attach(&self, context: ContextId, process: &ProcessRef<P>) {
        process.add_thread(context);
        if let Some(previous) = self.threads.insert(context, Arc::clone(process)) {
            kernel_panic!(
                "context {} attached to PID {} while still in PID {}",
                context,
                process.pid(),
                previous.pid()
            );
        }
    }

    /// Detach `context` from whatever process it runs in
    pub(crate) fn detach(&self, context: ContextId) -> ProcessRef<P> {
        match self.threads.remove(&context) {
            Some((_, process)) => {
                process.remove_thread(context);
                process
            }
            None => kernel_panic!("context {} escaped from its process", context),
        }
    }

    /// Create a control block and lifecycle node; the node is not linked
    pub(crate) fn proc_create(&self, name: &str) -> ProcResult<ProcessRef<P>> {
        let node = self.table.create_node()?;
        debug!("Created process {} (PID {})", name, node.pid());
        Ok(Arc::new(Process::new(name, node)))
    }

    /// Destroy a control block with no attached contexts
    ///
    /// Destroys any address space still installed and accounts for the
    /// process in the table, which may drain the population.
    pub(crate) fn proc_destroy(&self, process: ProcessRef<P>) {
        if process.thread_count() != 0 {
            kernel_panic!(
                "destroying PID {} with {} attached contexts",
                process.pid(),
                process.thread_count()
            );
        }
        if let Some(space) = process.set_space(None) {
            self.platform.as_destroy(space);
        }
        debug!("Destroyed process {} (PID {})", process.name(), process.pid());
        drop(process);
        self.table.process_destroyed();
    }

    /// Start `path` as a new top-level process
    ///
    /// The image is loaded and its arguments laid out before the context is
    /// spawned, so every failure is reported here. The kernel process never
    /// waits, so the new process is not watched.
    pub fn run_program(&self, path: &str, args: &[&str]) -> KernelResult<Pid> {
        let span = span_operation("run_program");
        let _entered = span.enter();

        let args: Vec<Vec<u8>> = args.iter().map(|arg| arg.as_bytes().to_vec()).collect();
        let process = self.proc_create(path)?;
        process.set_cwd(Some("/".to_string()));

        let image = match self.prepare_image(path, &args) {
            Ok(image) => image,
            Err(errno) => {
                span.record_error(errno.name());
                self.table.abandon(process.node());
                self.proc_destroy(process);
                return Err(KernelError::Syscall(errno));
            }
        };
        process.set_space(Some(Arc::clone(&image.space)));

        self.table.add_child(self.kproc.node(), process.node());
        self.table.set_watched(process.node(), false);

        let kernel = self.arc();
        let entry_process = Arc::clone(&process);
        let spawned = self.platform.spawn_context(
            path,
            Box::new(move || kernel.enter_new_process(entry_process, image)),
        );

        match spawned {
            Ok(context) => {
                info!("Started {} as PID {} on context {}", path, process.pid(), context);
                span.record_result(true);
                Ok(process.pid())
            }
            Err(e) => {
                span.record_error(&e.to_string());
                self.table.abandon(process.node());
                self.proc_destroy(process);
                Err(e.into())
            }
        }
    }

    /// First code run by a context started through `run_program`
    fn enter_new_process(self: Arc<Self>, process: ProcessRef<P>, image: PreparedImage<P::Space>) -> ! {
        let context = self.platform.current_context();
        self.attach(context, &process);
        self.platform.as_activate(&image.space);
        debug!("PID {} entering {} at {}", process.pid(), process.name(), image.entry);

        let tf = image.trap_frame();
        drop(image);
        drop(process);
        self.platform.enter_user(tf)
    }

    /// First code run by a forked child's context
    pub(crate) fn enter_forked_process(self: Arc<Self>, process: ProcessRef<P>, mut tf: TrapFrame) -> ! {
        let context = self.platform.current_context();
        self.attach(context, &process);

        let Some(space) = process.space() else {
            kernel_panic!("forked PID {} has no address space", process.pid());
        };
        self.platform.as_activate(&space);

        tf.set_return(0);
        tf.advance();
        debug!("Forked PID {} resuming at {}", process.pid(), tf.epc);

        drop(space);
        drop(process);
        self.platform.enter_user(tf)
    }

    /// Block until every user process has been destroyed
    pub fn wait_for_drain(&self) {
        self.table.wait_for_drain();
    }

    /// Diagnostic view of the lifecycle node holding `pid`
    pub fn inspect(&self, pid: Pid) -> Option<NodeSnapshot> {
        self.table.snapshot(pid)
    }

    /// Pids of every live lifecycle node, kernel root excluded
    pub fn live_pids(&self) -> Vec<Pid> {
        self.table.live_pids()
    }

    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }
}

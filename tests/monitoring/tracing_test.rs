/*!
 * Tracing Integration Tests
 * Subscriber installation and spans around real syscalls
 */

use proc_lifecycle::monitoring::{generate_trace_id, span_operation, span_syscall};
use proc_lifecycle::{init_tracing, Kernel, SimPlatform, UserCtx};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;

#[test]
#[serial]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    // A second call finds the global subscriber already installed
    assert!(!init_tracing());
}

#[test]
#[serial]
fn test_syscalls_run_under_installed_subscriber() {
    init_tracing();

    let platform = Arc::new(SimPlatform::new());
    platform.register_program("/bin/traced", |ctx: &mut UserCtx| {
        let child = ctx.fork(|c: &mut UserCtx| c.getpid() as i32 % 7).unwrap();
        ctx.waitpid(child).map(|_| 0).unwrap_or(1)
    });
    let kernel = Kernel::builder(Arc::clone(&platform))
        .with_max_processes(4)
        .boot()
        .unwrap();

    kernel.run_program("/bin/traced", &["traced"]).unwrap();
    kernel.wait_for_drain();
    assert!(platform.join_contexts().is_empty());
    assert_eq!(kernel.stats().live_nodes, 0);
}

#[test]
fn test_trace_ids_are_unique() {
    let ids: HashSet<String> = (0..64).map(|_| generate_trace_id()).collect();
    assert_eq!(ids.len(), 64);

    let syscall = span_syscall("getpid", 2);
    let operation = span_operation("run_program");
    assert_ne!(syscall.trace_id(), operation.trace_id());

    syscall.record_return(2);
    syscall.record_result(true);
    operation.record_error("ENOENT");
}

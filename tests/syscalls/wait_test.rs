/*!
 * waitpid Tests
 * Blocking, cached status, argument validation and child visibility
 */

use super::support::{boot, eventually, finish, Gate, Log, VARIANTS};
use pretty_assertions::assert_eq;
use proc_lifecycle::core::limits::KERNEL_PID;
use proc_lifecycle::{
    Errno, NodeState, ReclaimPolicy, SyscallNumber, UserAddr, UserCtx, WakeStrategy,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_wait_blocks_until_child_exits() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let log = Log::new();
        let gate = Gate::new();

        let (parent_log, child_gate) = (log.clone(), gate.clone());
        platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
            let gate = child_gate.clone();
            let child = ctx
                .fork(move |_child: &mut UserCtx| {
                    gate.wait();
                    5
                })
                .unwrap();
            parent_log.push(("forked", child as i64));
            let (reaped, status) = ctx.waitpid(child).unwrap();
            parent_log.push(("reaped", reaped as i64));
            parent_log.push(("status", status.exit_status() as i64));
            0
        });

        kernel.run_program("/bin/parent", &[]).unwrap();
        eventually("fork", || !log.snapshot().is_empty());

        // The parent must still be blocked while the child is held back
        thread::sleep(Duration::from_millis(50));
        assert_eq!(log.snapshot().len(), 1);

        gate.open();
        finish(&kernel, &platform);

        let entries = log.snapshot();
        let child = entries[0].1;
        assert_eq!(entries[1], ("reaped", child));
        assert_eq!(entries[2], ("status", 5));
    }
}

#[test]
fn test_wait_after_exit_returns_cached_status_immediately() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let weak = Arc::downgrade(&kernel);
        let log = Log::new();

        let parent_log = log.clone();
        platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
            let child = ctx.fork(|_child: &mut UserCtx| 3).unwrap();

            let kernel = weak.upgrade().unwrap();
            eventually("child exit", || {
                kernel
                    .inspect(child)
                    .is_some_and(|node| node.state == NodeState::Exited(3))
            });

            let start = Instant::now();
            let (_, status) = ctx.waitpid(child).unwrap();
            parent_log.push((status.exit_status(), start.elapsed()));
            0
        });

        kernel.run_program("/bin/parent", &[]).unwrap();
        finish(&kernel, &platform);

        let entries = log.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, 3);
        assert!(entries[0].1 < Duration::from_secs(1));
    }
}

#[test]
fn test_only_direct_children_are_waitable() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let log = Log::new();
        let grandchild_pid = Log::new();
        let release = Gate::new();

        let (parent_log, shared_pid, gate) = (log.clone(), grandchild_pid.clone(), release.clone());
        platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
            let me = ctx.getpid();

            // Child A forks the grandchild and waits for it
            let (a_pid, a_gate) = (shared_pid.clone(), gate.clone());
            let a = ctx
                .fork(move |a: &mut UserCtx| {
                    let g_gate = a_gate.clone();
                    let grandchild = a
                        .fork(move |_g: &mut UserCtx| {
                            g_gate.wait();
                            0
                        })
                        .unwrap();
                    a_pid.push(grandchild);
                    a.waitpid(grandchild).map(|_| 0).unwrap_or(1)
                })
                .unwrap();

            // Sibling B tries to wait on A
            let b = ctx
                .fork(move |b: &mut UserCtx| match b.waitpid(a) {
                    Err(Errno::ECHILD) => 0,
                    _ => 1,
                })
                .unwrap();

            eventually("grandchild pid", || !shared_pid.snapshot().is_empty());
            let grandchild = shared_pid.snapshot()[0];

            parent_log.push(ctx.waitpid(grandchild).err());
            parent_log.push(ctx.waitpid(me).err());
            parent_log.push(ctx.waitpid(KERNEL_PID).err());
            parent_log.push(ctx.waitpid(31_000).err());
            parent_log.push(ctx.waitpid_raw(usize::MAX, ctx.status_addr(), 0).err());

            gate.open();
            let (_, a_status) = ctx.waitpid(a).unwrap();
            let (_, b_status) = ctx.waitpid(b).unwrap();
            a_status.exit_status() + b_status.exit_status()
        });

        kernel.run_program("/bin/parent", &[]).unwrap();
        finish(&kernel, &platform);

        assert_eq!(log.snapshot(), vec![Some(Errno::ECHILD); 5]);
    }
}

#[test]
fn test_invalid_options_rejected_without_blocking() {
    let (kernel, platform) = boot(ReclaimPolicy::PerNode, WakeStrategy::PerNode);
    let log = Log::new();
    let gate = Gate::new();

    let (parent_log, child_gate) = (log.clone(), gate.clone());
    platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
        let held = child_gate.clone();
        let child = ctx
            .fork(move |_c: &mut UserCtx| {
                held.wait();
                4
            })
            .unwrap();

        // The child is still running: none of these may block
        parent_log.push(ctx.waitpid_raw(child as usize, ctx.status_addr(), 1).err());
        parent_log.push(ctx.waitpid_raw(child as usize, UserAddr::NULL, 0).err());
        parent_log.push(ctx.waitpid_raw(child as usize, UserAddr::NULL, 2).err());
        // Bits above the low word of the options register count too
        let status = ctx.status_addr().as_usize();
        let high_options = [child as usize, status, 1usize << 32, 0];
        parent_log.push(ctx.syscall_raw(SyscallNumber::Waitpid as usize, high_options).err());

        child_gate.open();
        let (_, status) = ctx.waitpid(child).unwrap();
        status.exit_status()
    });

    kernel.run_program("/bin/parent", &[]).unwrap();
    finish(&kernel, &platform);

    assert_eq!(
        log.snapshot(),
        vec![
            Some(Errno::EINVAL),
            Some(Errno::EFAULT),
            Some(Errno::EINVAL),
            Some(Errno::EINVAL)
        ]
    );
}

#[test]
fn test_faulting_status_pointer_leaves_child_waitable() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let log = Log::new();

        let parent_log = log.clone();
        platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
            let child = ctx.fork(|_c: &mut UserCtx| 9).unwrap();

            let unmapped = UserAddr(0x7000_0000);
            parent_log.push(ctx.waitpid_raw(child as usize, unmapped, 0).err());

            let (reaped, status) = ctx.waitpid(child).unwrap();
            assert_eq!(reaped, child);
            status.exit_status()
        });

        kernel.run_program("/bin/parent", &[]).unwrap();
        finish(&kernel, &platform);
        assert_eq!(log.snapshot(), vec![Some(Errno::EFAULT)]);
    }
}

#[test]
fn test_second_wait_follows_reclaim_policy() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let log = Log::new();

        let parent_log = log.clone();
        platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
            let child = ctx.fork(|_c: &mut UserCtx| 6).unwrap();
            let first = ctx.waitpid(child).map(|(_, s)| s.exit_status());
            let second = ctx.waitpid(child).map(|(_, s)| s.exit_status());
            parent_log.push((first, second));
            0
        });

        kernel.run_program("/bin/parent", &[]).unwrap();
        finish(&kernel, &platform);

        let expected_second = match reclaim {
            ReclaimPolicy::DrainReset => Ok(6),
            ReclaimPolicy::PerNode => Err(Errno::ECHILD),
        };
        assert_eq!(log.snapshot(), vec![(Ok(6), expected_second)]);
    }
}

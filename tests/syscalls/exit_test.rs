/*!
 * _exit Tests
 * Status delivery, orphaning and crash handling
 */

use super::support::{boot, eventually, finish, Gate, Log, VARIANTS};
use pretty_assertions::assert_eq;
use proc_lifecycle::{NodeState, ReclaimPolicy, UserCtx, WakeStrategy, FAULT_EXIT_CODE};

#[test]
fn test_exit_status_reaches_parent() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let log = Log::new();

        let parent_log = log.clone();
        platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
            for code in [0, 1, 42, 255] {
                // Exit from deep inside the program, not by returning
                let child = ctx.fork(move |c: &mut UserCtx| c.exit(code)).unwrap();
                let (_, status) = ctx.waitpid(child).unwrap();
                parent_log.push((status.exited(), status.exit_status(), status.raw()));
            }
            0
        });

        kernel.run_program("/bin/parent", &[]).unwrap();
        finish(&kernel, &platform);

        assert_eq!(
            log.snapshot(),
            vec![(true, 0, 0), (true, 1, 4), (true, 42, 168), (true, 255, 1020)]
        );
    }
}

#[test]
fn test_parent_exit_unwatches_children() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let children = Log::new();
        let results = Log::new();
        let (release, keep) = (Gate::new(), Gate::new());

        // Holds the population open so a drain cannot hide the nodes
        let held = keep.clone();
        platform.register_program("/bin/keeper", move |_ctx: &mut UserCtx| {
            held.wait();
            0
        });

        let (pids, results_log, gate) = (children.clone(), results.clone(), release.clone());
        platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
            let (a_gate, a_log) = (gate.clone(), results_log.clone());
            let a = ctx
                .fork(move |a: &mut UserCtx| {
                    a_gate.wait();
                    // An orphan can still fork and wait on its own children
                    let grandchild = a.fork(|_g: &mut UserCtx| 1).unwrap();
                    let status = a.waitpid(grandchild).map(|(_, s)| s.exit_status());
                    a_log.push(status);
                    11
                })
                .unwrap();
            let b_gate = gate.clone();
            let b = ctx
                .fork(move |_b: &mut UserCtx| {
                    b_gate.wait();
                    2
                })
                .unwrap();
            pids.push(a);
            pids.push(b);
            7
        });

        kernel.run_program("/bin/keeper", &[]).unwrap();
        let parent = kernel.run_program("/bin/parent", &[]).unwrap();

        eventually("parent exit", || match reclaim {
            ReclaimPolicy::DrainReset => kernel
                .inspect(parent)
                .is_some_and(|node| node.state == NodeState::Exited(7)),
            ReclaimPolicy::PerNode => kernel.inspect(parent).is_none(),
        });

        let pids = children.snapshot();
        for &pid in &pids {
            let node = kernel.inspect(pid).unwrap();
            assert_eq!(node.state, NodeState::Running);
            assert!(!node.watched);
            let expected_parent = match reclaim {
                ReclaimPolicy::DrainReset => Some(parent),
                ReclaimPolicy::PerNode => None,
            };
            assert_eq!(node.parent, expected_parent);
        }

        release.open();
        for (&pid, code) in pids.iter().zip([11, 2]) {
            eventually("child exit", || match reclaim {
                ReclaimPolicy::DrainReset => kernel
                    .inspect(pid)
                    .is_some_and(|node| node.state == NodeState::Exited(code)),
                ReclaimPolicy::PerNode => kernel.inspect(pid).is_none(),
            });
        }
        assert_eq!(results.snapshot(), vec![Ok(1)]);

        // Only the keeper is left
        assert_eq!(kernel.stats().live_processes, 1);
        if reclaim == ReclaimPolicy::PerNode {
            assert_eq!(kernel.stats().live_nodes, 1);
        }

        keep.open();
        finish(&kernel, &platform);
    }
}

#[test]
fn test_exited_child_kept_until_parent_waits() {
    let (kernel, platform) = boot(ReclaimPolicy::PerNode, WakeStrategy::PerNode);
    let child_pid = Log::new();
    let gate = Gate::new();

    let (log, held) = (child_pid.clone(), gate.clone());
    platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
        let child = ctx.fork(|_c: &mut UserCtx| 4).unwrap();
        log.push(child);
        held.wait();
        ctx.waitpid(child).map(|(_, s)| s.exit_status()).unwrap_or(-1)
    });

    let parent = kernel.run_program("/bin/parent", &[]).unwrap();
    eventually("fork", || !child_pid.snapshot().is_empty());
    let child = child_pid.snapshot()[0];

    // Exited and watched: the node must survive for the parent
    eventually("child exit", || {
        kernel
            .inspect(child)
            .is_some_and(|node| node.state == NodeState::Exited(4))
    });
    assert_eq!(kernel.inspect(child).unwrap().parent, Some(parent));

    gate.open();
    finish(&kernel, &platform);
    assert_eq!(kernel.inspect(child), None);
}

#[test]
fn test_crashed_program_reports_fault_code() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let log = Log::new();

        let parent_log = log.clone();
        platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
            let child = ctx
                .fork(|_c: &mut UserCtx| -> i32 { panic!("segmentation fault") })
                .unwrap();
            parent_log.push(ctx.waitpid(child).map(|(_, s)| s.exit_status()));
            0
        });

        kernel.run_program("/bin/parent", &[]).unwrap();
        kernel.wait_for_drain();

        let failures = platform.join_contexts();
        assert_eq!(failures.len(), 1, "{:?}", failures);
        assert!(failures[0].contains("crashed"));
        assert_eq!(log.snapshot(), vec![Ok(FAULT_EXIT_CODE)]);
        assert_eq!(kernel.stats().live_nodes, 0);
        assert_eq!(platform.live_spaces(), 0);
    }
}

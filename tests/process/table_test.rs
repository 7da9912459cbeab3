/*!
 * Process Table Tests
 * Rendezvous behaviour under concurrent waiters and stale handles
 */

use pretty_assertions::assert_eq;
use proc_lifecycle::process::{NodeHandle, ProcTable};
use proc_lifecycle::{KernelConfig, NodeState, ProcError, ReclaimPolicy, WakeStrategy};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn table(reclaim: ReclaimPolicy, wake: WakeStrategy) -> Arc<ProcTable> {
    Arc::new(ProcTable::new(
        &KernelConfig::default()
            .with_reclaim(reclaim)
            .with_wake(wake)
            .with_max_processes(32),
    ))
}

fn child_of(table: &ProcTable, parent: NodeHandle) -> NodeHandle {
    let node = table.create_node().unwrap();
    table.add_child(parent, node);
    node
}

#[test]
fn test_two_waiters_on_one_node() {
    for reclaim in [ReclaimPolicy::DrainReset, ReclaimPolicy::PerNode] {
        for wake in [WakeStrategy::Shared, WakeStrategy::PerNode] {
            let table = table(reclaim, wake);
            let parent = child_of(&table, table.root());
            let child = child_of(&table, parent);

            let waiters: Vec<_> = (0..2)
                .map(|_| {
                    let table = Arc::clone(&table);
                    thread::spawn(move || table.wait_exit(child))
                })
                .collect();

            thread::sleep(Duration::from_millis(20));
            table.publish_exit(child, 12);
            for waiter in waiters {
                assert_eq!(waiter.join().unwrap(), Ok(12));
            }

            table.consume(child);
            let again = table.wait_exit(child);
            match reclaim {
                ReclaimPolicy::DrainReset => assert_eq!(again, Ok(12)),
                ReclaimPolicy::PerNode => {
                    assert_eq!(again, Err(ProcError::NoSuchChild(child.pid())))
                }
            }
        }
    }
}

#[test]
fn test_many_waiters_each_see_their_own_child() {
    for wake in [WakeStrategy::Shared, WakeStrategy::PerNode] {
        let table = table(ReclaimPolicy::PerNode, wake);
        let parent = child_of(&table, table.root());
        let children: Vec<NodeHandle> = (0..8).map(|_| child_of(&table, parent)).collect();

        let waiters: Vec<_> = children
            .iter()
            .map(|&child| {
                let table = Arc::clone(&table);
                thread::spawn(move || (child.pid(), table.wait_exit(child)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        for child in children.iter().rev() {
            table.publish_exit(*child, child.pid() as i32 * 2);
        }

        for waiter in waiters {
            let (pid, code) = waiter.join().unwrap();
            assert_eq!(code, Ok(pid as i32 * 2));
        }
    }
}

#[test]
fn test_stale_handle_never_sees_recycled_pid() {
    let table = Arc::new(ProcTable::new(
        &KernelConfig::default()
            .with_reclaim(ReclaimPolicy::PerNode)
            .with_pid_range(2, 4)
            .with_max_processes(3),
    ));
    let parent = child_of(&table, table.root());
    let old = child_of(&table, parent);
    let filler = child_of(&table, parent);
    assert_eq!((parent.pid(), old.pid(), filler.pid()), (2, 3, 4));

    table.publish_exit(old, 1);
    table.consume(old);

    // The range is used up, so the next node must reuse the freed id
    let new = child_of(&table, parent);
    assert_eq!(new.pid(), old.pid());

    assert_eq!(table.find_child(parent, 3), Some(new));
    assert_eq!(table.exit_code(old), None);
    assert_eq!(table.wait_exit(old), Err(ProcError::NoSuchChild(3)));
    assert_eq!(table.snapshot(3).unwrap().state, NodeState::Running);
}

#[test]
fn test_abandoned_waiter_target_wakes_waiter() {
    let table = table(ReclaimPolicy::PerNode, WakeStrategy::PerNode);
    let parent = child_of(&table, table.root());
    let child = child_of(&table, parent);

    let waiter = {
        let table = Arc::clone(&table);
        thread::spawn(move || table.wait_exit(child))
    };

    thread::sleep(Duration::from_millis(20));
    table.abandon(child);
    assert_eq!(
        waiter.join().unwrap(),
        Err(ProcError::NoSuchChild(child.pid()))
    );
}

#[test]
fn test_snapshot_serializes() {
    let table = table(ReclaimPolicy::DrainReset, WakeStrategy::Shared);
    let parent = child_of(&table, table.root());
    let child = child_of(&table, parent);
    table.publish_exit(child, 5);

    let json = serde_json::to_value(table.snapshot(child.pid()).unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "pid": child.pid(),
            "parent": parent.pid(),
            "state": { "state": "exited", "code": 5 },
            "watched": true,
            "children": [],
        })
    );

    let stats = serde_json::to_value(table.stats()).unwrap();
    assert_eq!(stats["live_nodes"], 2);
    assert_eq!(stats["reclaim"], "drain_reset");
}

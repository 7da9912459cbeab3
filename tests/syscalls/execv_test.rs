/*!
 * execv Tests
 * Argument layout, image replacement and failure isolation
 */

use super::support::{boot, boot_with, finish, Log, VARIANTS};
use pretty_assertions::assert_eq;
use proc_lifecycle::core::limits::{PATH_MAX, USER_SCRATCH_BASE, USER_STACK_TOP};
use proc_lifecycle::{
    Errno, KernelConfig, KernelError, ReclaimPolicy, SimPlatform, UserAddr, UserCtx,
    WakeStrategy,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct Layout {
    argc: usize,
    argv: usize,
    sp: usize,
    pointers: Vec<usize>,
    args: Vec<String>,
}

fn read_word(ctx: &UserCtx, addr: usize) -> usize {
    let raw = ctx.peek(UserAddr(addr), 8).unwrap();
    let mut word = [0u8; 8];
    word.copy_from_slice(&raw);
    u64::from_le_bytes(word) as usize
}

fn capture_layout(ctx: &UserCtx) -> Layout {
    let regs = ctx.registers();
    let (argc, argv) = (regs.args[0], regs.args[1]);
    Layout {
        argc,
        argv,
        sp: regs.sp.as_usize(),
        pointers: (0..=argc).map(|i| read_word(ctx, argv + i * 8)).collect(),
        args: ctx.args(),
    }
}

fn register_show(platform: &SimPlatform, log: &Log<Layout>) {
    let log = log.clone();
    platform.register_program("/bin/show", move |ctx: &mut UserCtx| {
        log.push(capture_layout(ctx));
        0
    });
}

#[test]
fn test_argument_vector_layout() {
    let (kernel, platform) = boot(ReclaimPolicy::PerNode, WakeStrategy::PerNode);
    let log = Log::new();
    register_show(&platform, &log);

    kernel.run_program("/bin/show", &["show", "alpha", "be"]).unwrap();
    finish(&kernel, &platform);

    let top = USER_STACK_TOP.as_usize();
    let layout = log.snapshot().remove(0);
    assert_eq!(
        layout,
        Layout {
            argc: 3,
            argv: top - 56,
            sp: top - 56,
            // First argument highest, each padded to 8 bytes
            pointers: vec![top - 8, top - 16, top - 24, 0],
            args: vec!["show".to_string(), "alpha".to_string(), "be".to_string()],
        }
    );
    assert_eq!(layout.argv % 8, 0);
}

#[test]
fn test_empty_argument_vector() {
    let (kernel, platform) = boot(ReclaimPolicy::DrainReset, WakeStrategy::Shared);
    let log = Log::new();
    register_show(&platform, &log);

    kernel.run_program("/bin/show", &[]).unwrap();
    finish(&kernel, &platform);

    let layout = log.snapshot().remove(0);
    assert_eq!(layout.argc, 0);
    assert_eq!(layout.argv, layout.sp);
    assert_eq!(layout.pointers, vec![0]);
    assert!(layout.args.is_empty());
}

#[test]
fn test_long_argument_is_padded() {
    let (kernel, platform) = boot(ReclaimPolicy::PerNode, WakeStrategy::Shared);
    let log = Log::new();
    register_show(&platform, &log);

    // 9 bytes with the terminator: padded to 16
    kernel.run_program("/bin/show", &["12345678", "x"]).unwrap();
    finish(&kernel, &platform);

    let top = USER_STACK_TOP.as_usize();
    let layout = log.snapshot().remove(0);
    assert_eq!(layout.pointers, vec![top - 16, top - 24, 0]);
    assert_eq!(layout.argv, top - 48);
}

#[test]
fn test_execv_keeps_pid_and_replaces_image() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let log = Log::new();
        let marker = USER_SCRATCH_BASE.add(0x4000);

        let image_log = log.clone();
        platform.register_program("/bin/next", move |ctx: &mut UserCtx| {
            image_log.push(format!("pid {}", ctx.getpid()));
            image_log.push(format!("args {:?}", ctx.args()));
            // The new image starts from a fresh address space
            image_log.push(format!("marker {:?}", ctx.peek(marker, 4).unwrap()));
            21
        });

        let parent_log = log.clone();
        platform.register_program("/bin/parent", move |ctx: &mut UserCtx| {
            let child = ctx
                .fork(move |child: &mut UserCtx| {
                    child.poke(marker, b"old!").unwrap();
                    let errno = child.execv("/bin/next", &["next", "--flag"]);
                    panic!("execv failed: {}", errno);
                })
                .unwrap();
            let (reaped, status) = ctx.waitpid(child).unwrap();
            parent_log.push(format!("forked {}", child));
            parent_log.push(format!("reaped {} status {}", reaped, status.exit_status()));
            0
        });

        kernel.run_program("/bin/parent", &[]).unwrap();
        finish(&kernel, &platform);

        let entries = log.snapshot();
        let child = entries[3].trim_start_matches("forked ").to_string();
        assert_eq!(entries[0], format!("pid {}", child));
        assert_eq!(entries[1], r#"args ["next", "--flag"]"#);
        assert_eq!(entries[2], "marker [0, 0, 0, 0]");
        assert_eq!(entries[4], format!("reaped {} status 21", child));
    }
}

#[test]
fn test_failed_execv_leaves_caller_intact() {
    for (reclaim, wake) in VARIANTS {
        let (kernel, platform) = boot(reclaim, wake);
        let log = Log::new();
        let layouts = Log::new();
        register_show(&platform, &layouts);
        platform.register_data("/etc/motd");
        let weak_platform = Arc::downgrade(&platform);

        let caller_log = log.clone();
        platform.register_program("/bin/caller", move |ctx: &mut UserCtx| {
            let platform = weak_platform.upgrade().unwrap();
            let spaces = platform.live_spaces();
            let me = ctx.getpid();
            let marker = USER_SCRATCH_BASE.add(0x4000);
            ctx.poke(marker, b"still here").unwrap();

            let too_long = format!("/{}", "a".repeat(PATH_MAX));
            let just_fits = format!("/{}", "a".repeat(PATH_MAX - 2));
            let mut results = vec![
                ctx.execv("/bin/nope", &["nope"]),
                ctx.execv("/etc/motd", &["motd"]),
                ctx.execv(&too_long, &[]),
                ctx.execv(&just_fits, &[]),
                ctx.execv("", &[]),
            ];

            // Bad pointers: NULL path, NULL argv, argv entry into unmapped memory
            let path = USER_SCRATCH_BASE.add(0x5000);
            let argv = USER_SCRATCH_BASE.add(0x6000);
            ctx.poke(path, b"/bin/show\0").unwrap();
            ctx.poke(argv, &0x7000_0000u64.to_le_bytes()).unwrap();
            ctx.poke(argv.add(8), &0u64.to_le_bytes()).unwrap();
            results.push(ctx.execv_raw(UserAddr::NULL, argv));
            results.push(ctx.execv_raw(path, UserAddr::NULL));
            results.push(ctx.execv_raw(path, argv));
            caller_log.push(results);

            let intact = ctx.peek(marker, 10).unwrap() == b"still here"
                && ctx.getpid() == me
                && platform.live_spaces() == spaces;
            if !intact {
                return 1;
            }
            drop(platform);

            // A good execv still works afterwards
            let errno = ctx.execv("/bin/show", &["show"]);
            panic!("execv failed: {}", errno);
        });

        kernel.run_program("/bin/caller", &[]).unwrap();
        finish(&kernel, &platform);

        assert_eq!(
            log.snapshot(),
            vec![vec![
                Errno::ENOENT,
                Errno::ENOEXEC,
                Errno::ENAMETOOLONG,
                Errno::ENOENT,
                Errno::EINVAL,
                Errno::EFAULT,
                Errno::EFAULT,
                Errno::EFAULT,
            ]]
        );
        assert_eq!(layouts.snapshot().len(), 1);
        assert_eq!(layouts.snapshot()[0].args, vec!["show".to_string()]);
    }
}

#[test]
fn test_oversized_arguments_are_e2big() {
    let mut config = KernelConfig::default().with_max_processes(8);
    config.arg_max = 64;
    let (kernel, platform) = boot_with(config);
    let log = Log::new();
    let layouts = Log::new();
    register_show(&platform, &layouts);

    let caller_log = log.clone();
    platform.register_program("/bin/caller", move |ctx: &mut UserCtx| {
        let long = "x".repeat(100);
        caller_log.push(ctx.execv("/bin/show", &[long.as_str()]));

        // Each argument fits, the total does not
        let many = vec!["12345678"; 10];
        caller_log.push(ctx.execv("/bin/show", &many));

        // Exactly at the limit is fine: 8 * 8 bytes with terminators
        let exact = vec!["1234567"; 8];
        let errno = ctx.execv("/bin/show", &exact);
        panic!("execv failed: {}", errno);
    });

    let long = "y".repeat(65);
    assert!(matches!(
        kernel.run_program("/bin/show", &[long.as_str()]),
        Err(KernelError::Syscall(Errno::E2BIG))
    ));

    kernel.run_program("/bin/caller", &[]).unwrap();
    finish(&kernel, &platform);

    assert_eq!(log.snapshot(), vec![Errno::E2BIG, Errno::E2BIG]);
    assert_eq!(layouts.snapshot()[0].argc, 8);
}

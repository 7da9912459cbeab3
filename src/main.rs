/*!
 * Process Lifecycle Kernel - Demo Entry Point
 *
 * Boots the kernel on the host simulation platform and runs a small shell
 * style workload: a parent that forks workers, waits for them, and execs.
 */

use miette::{IntoDiagnostic, Result};
use proc_lifecycle::{init_tracing, Kernel, KernelConfig, SimPlatform, UserCtx};
use std::sync::Arc;
use tracing::{info, warn};

fn register_programs(platform: &SimPlatform) {
    platform.register_program("/bin/worker", |ctx: &mut UserCtx| {
        let args = ctx.args();
        let pid = ctx.getpid();
        info!(pid, ?args, "worker running");
        args.get(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or(0)
    });

    platform.register_program("/bin/init", |ctx: &mut UserCtx| {
        let mut total = 0;
        for code in 1..=3 {
            let spawned = ctx.fork(move |child: &mut UserCtx| {
                let arg = code.to_string();
                let errno = child.execv("/bin/worker", &["worker", arg.as_str()]);
                warn!(%errno, "execv failed");
                1
            });

            match spawned {
                Ok(pid) => match ctx.waitpid(pid) {
                    Ok((_, status)) => {
                        info!(child = pid, code = status.exit_status(), "child reaped");
                        total += status.exit_status();
                    }
                    Err(errno) => warn!(child = pid, %errno, "waitpid failed"),
                },
                Err(errno) => warn!(%errno, "fork failed"),
            }
        }
        total
    });
}

fn main() -> Result<()> {
    init_tracing();

    let config = KernelConfig::from_env()?;
    info!(?config, "Process lifecycle kernel starting");

    let platform = Arc::new(SimPlatform::new());
    register_programs(&platform);

    let kernel = Kernel::builder(Arc::clone(&platform))
        .with_config(config)
        .boot()?;

    let pid = kernel.run_program("/bin/init", &["init"])?;
    info!(pid, "init started");

    kernel.wait_for_drain();
    let failures = platform.join_contexts();
    for failure in &failures {
        warn!(%failure, "context failed");
    }

    let stats = kernel.stats();
    info!("{}", serde_json::to_string(&stats).into_diagnostic()?);
    info!(live_spaces = platform.live_spaces(), "All processes finished");
    Ok(())
}

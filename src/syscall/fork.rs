/*!
 * fork
 *
 * The child is linked under the parent before its context is spawned, so it
 * can never exit unlinked. Every failure unwinds what was built so far.
 */

use super::Errno;
use crate::core::types::Pid;
use crate::kernel::{Kernel, ProcessRef};
use crate::kernel_panic;
use crate::platform::{Platform, TrapFrame};
use log::{debug, warn};
use std::sync::Arc;

impl<P: Platform> Kernel<P> {
    pub(crate) fn sys_fork(&self, parent: &ProcessRef<P>, tf: &TrapFrame) -> Result<Pid, Errno> {
        let Some(parent_space) = parent.space() else {
            kernel_panic!("PID {} trapped without an address space", parent.pid());
        };

        let child = self.proc_create(parent.name()).map_err(|e| {
            warn!("fork from PID {} refused: {}", parent.pid(), e);
            Errno::from(e)
        })?;

        let space = match self.platform.as_copy(&parent_space) {
            Ok(space) => space,
            Err(e) => {
                warn!("fork from PID {}: cannot copy address space: {}", parent.pid(), e);
                self.table.abandon(child.node());
                self.proc_destroy(child);
                return Err(e.into());
            }
        };
        child.set_space(Some(space));
        child.set_cwd(parent.cwd());

        self.table.add_child(parent.node(), child.node());

        let kernel = self.arc();
        let entry_child = Arc::clone(&child);
        let child_tf = tf.clone();
        let spawned = self.platform.spawn_context(
            child.name(),
            Box::new(move || kernel.enter_forked_process(entry_child, child_tf)),
        );

        match spawned {
            Ok(context) => {
                debug!(
                    "PID {} forked PID {} on context {}",
                    parent.pid(),
                    child.pid(),
                    context
                );
                Ok(child.pid())
            }
            Err(e) => {
                warn!("fork from PID {}: cannot spawn context: {}", parent.pid(), e);
                self.table.abandon(child.node());
                self.proc_destroy(child);
                Err(e.into())
            }
        }
    }
}

/*!
 * _exit
 *
 * Publish the status first, then release everything the process owns. The
 * lifecycle node outlives the control block for as long as the reclamation
 * policy keeps it.
 */

use crate::core::types::{ContextId, ExitCode};
use crate::kernel::{Kernel, ProcessRef};
use crate::platform::Platform;
use log::debug;

impl<P: Platform> Kernel<P> {
    pub(crate) fn sys_exit(&self, context: ContextId, process: ProcessRef<P>, code: ExitCode) -> ! {
        debug!("PID {} exiting with code {}", process.pid(), code);
        self.table.publish_exit(process.node(), code);

        if let Some(space) = process.set_space(None) {
            self.platform.as_deactivate();
            self.platform.as_destroy(space);
        }

        self.detach(context);
        self.proc_destroy(process);

        self.platform.exit_context()
    }
}

/*!
 * waitpid
 *
 * Arguments are validated before any lookup, so a bad call never blocks.
 * The status is only consumed once it has reached the caller.
 */

use super::status::mkwait_exit;
use super::Errno;
use crate::core::types::{Pid, UserAddr};
use crate::kernel::{Kernel, ProcessRef};
use crate::kernel_panic;
use crate::platform::{Platform, UserAccess};
use log::debug;

impl<P: Platform> Kernel<P> {
    pub(crate) fn sys_waitpid(
        &self,
        process: &ProcessRef<P>,
        pid: usize,
        status: UserAddr,
        options: usize,
    ) -> Result<Pid, Errno> {
        // No options are supported; the whole register must be clear
        if options != 0 {
            return Err(Errno::EINVAL);
        }
        if status.is_null() {
            return Err(Errno::EFAULT);
        }
        let pid = Pid::try_from(pid).map_err(|_| Errno::ECHILD)?;
        let child = self
            .table
            .find_child(process.node(), pid)
            .ok_or(Errno::ECHILD)?;

        debug!("PID {} waiting for PID {}", process.pid(), pid);
        let code = self.table.wait_exit(child)?;

        let Some(space) = process.space() else {
            kernel_panic!("PID {} trapped without an address space", process.pid());
        };
        self.platform
            .copy_out_i32(&space, status, mkwait_exit(code))?;
        self.table.consume(child);

        debug!("PID {} reaped PID {} (code {})", process.pid(), pid, code);
        Ok(pid)
    }
}

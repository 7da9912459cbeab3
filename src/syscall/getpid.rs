/*!
 * getpid
 */

use crate::core::types::Pid;
use crate::kernel::{Kernel, ProcessRef};
use crate::platform::Platform;

impl<P: Platform> Kernel<P> {
    #[inline]
    pub(crate) fn sys_getpid(&self, process: &ProcessRef<P>) -> Pid {
        process.pid()
    }
}

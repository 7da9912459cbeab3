/*!
 * Syscall Dispatch
 *
 * Decodes a trap frame, runs the syscall inside a tracing span and writes
 * the result back. Syscalls that do not return close their span first.
 */

use super::{Errno, SyscallNumber};
use crate::core::types::{ContextId, UserAddr};
use crate::kernel::Kernel;
use crate::monitoring::SyscallSpan;
use crate::platform::{Platform, TrapFrame, TrapHandler};
use log::warn;

impl<P: Platform> TrapHandler for Kernel<P> {
    fn syscall(&self, context: ContextId, tf: &mut TrapFrame) {
        let process = self.process_of(context);

        let number = match SyscallNumber::try_from(tf.callno) {
            Ok(number) => number,
            Err(errno) => {
                warn!("PID {} made unknown syscall {}", process.pid(), tf.callno);
                tf.set_error(errno.code());
                tf.advance();
                return;
            }
        };

        let span = match number {
            SyscallNumber::Waitpid => SyscallSpan::blocking(number.name(), process.pid()),
            _ => SyscallSpan::new(number.name(), process.pid()),
        };

        let result: Result<i64, Errno> = match number {
            SyscallNumber::Fork => self.sys_fork(&process, tf).map(i64::from),
            SyscallNumber::Getpid => Ok(i64::from(self.sys_getpid(&process))),
            SyscallNumber::Waitpid => self
                .sys_waitpid(&process, tf.args[0], UserAddr(tf.args[1]), tf.args[2])
                .map(i64::from),
            SyscallNumber::Exit => {
                let code = tf.args[0] as u32 as i32;
                span.record_return(i64::from(code));
                drop(span);
                self.sys_exit(context, process, code)
            }
            SyscallNumber::Execv => {
                match self.sys_execv_prepare(&process, UserAddr(tf.args[0]), UserAddr(tf.args[1])) {
                    Ok(image) => {
                        span.record_result(true);
                        drop(span);
                        self.commit_image(&process, image)
                    }
                    Err(errno) => Err(errno),
                }
            }
        };

        match result {
            Ok(value) => {
                span.record_return(value);
                span.record_result(true);
                tf.set_return(value);
            }
            Err(errno) => {
                span.record_error(errno.name());
                tf.set_error(errno.code());
            }
        }
        tf.advance();
    }
}

/*!
 * execv
 *
 * Image replacement in two phases. `prepare` does every fallible step (copy
 * in path and arguments, build and load a fresh address space, lay out the
 * argument vector) without touching the caller. `commit` swaps the spaces
 * and enters the new image; it cannot fail and does not return.
 *
 * # Argument layout
 *
 * From the stack top downwards: each string with its terminator, padded to
 * `ARGV_ALIGN`, first argument highest; then the NULL-terminated pointer
 * array with `argv[0]` lowest. The entry stack pointer equals `argv`.
 */

use super::Errno;
use crate::core::limits::{ARGV_ALIGN, USER_PTR_SIZE};
use crate::core::types::{round_up, UserAddr};
use crate::kernel::{Kernel, ProcessRef};
use crate::kernel_panic;
use crate::platform::{Platform, PlatformError, TrapFrame, UserAccess};
use log::{debug, warn};
use std::sync::Arc;

/// A loaded image ready to be entered
pub struct PreparedImage<S> {
    pub(crate) space: Arc<S>,
    pub(crate) entry: UserAddr,
    pub(crate) sp: UserAddr,
    pub(crate) argc: usize,
}

impl<S> PreparedImage<S> {
    /// Registers for entering the image: `argc`, `argv == sp`, pc at entry
    pub(crate) fn trap_frame(&self) -> TrapFrame {
        TrapFrame::user_entry(self.entry, self.sp, self.argc, self.sp)
    }
}

impl<P: Platform> Kernel<P> {
    /// Copy in the caller's path and argument vector and build the new image
    pub(crate) fn sys_execv_prepare(
        &self,
        process: &ProcessRef<P>,
        path: UserAddr,
        argv: UserAddr,
    ) -> Result<PreparedImage<P::Space>, Errno> {
        if path.is_null() || argv.is_null() {
            return Err(Errno::EFAULT);
        }
        let Some(space) = process.space() else {
            kernel_panic!("PID {} trapped without an address space", process.pid());
        };

        let path = self.platform.copy_in_str(&space, path, self.config.path_max)?;
        let path = String::from_utf8(path).map_err(|_| Errno::ENOENT)?;
        let args = self.copy_in_args(&space, argv)?;

        self.prepare_image(&path, &args).inspect_err(|errno| {
            warn!("execv {} from PID {} failed: {}", path, process.pid(), errno.name());
        })
    }

    fn copy_in_args(&self, space: &P::Space, argv: UserAddr) -> Result<Vec<Vec<u8>>, Errno> {
        let mut args = Vec::new();
        let mut total = 0usize;

        loop {
            let ptr = self
                .platform
                .copy_in_ptr(space, argv.add(args.len() * USER_PTR_SIZE))?;
            if ptr.is_null() {
                return Ok(args);
            }

            let remaining = self.config.arg_max.saturating_sub(total);
            if remaining == 0 {
                return Err(Errno::E2BIG);
            }
            let arg = match self.platform.copy_in_str(space, ptr, remaining) {
                Ok(arg) => arg,
                Err(PlatformError::NameTooLong { .. }) => return Err(Errno::E2BIG),
                Err(e) => return Err(e.into()),
            };
            total += arg.len() + 1;
            args.push(arg);
        }
    }

    /// Build a fresh address space holding `path` with `args` on its stack
    ///
    /// The space is destroyed again on any failure.
    pub(crate) fn prepare_image(
        &self,
        path: &str,
        args: &[Vec<u8>],
    ) -> Result<PreparedImage<P::Space>, Errno> {
        if path.is_empty() {
            return Err(Errno::EINVAL);
        }
        if path.len() >= self.config.path_max {
            return Err(Errno::ENAMETOOLONG);
        }
        let total: usize = args.iter().map(|arg| arg.len() + 1).sum();
        if total > self.config.arg_max {
            return Err(Errno::E2BIG);
        }

        let space = self.platform.as_create()?;
        match self.load_into(&space, path, args) {
            Ok((entry, sp)) => {
                debug!("Prepared {} with {} args, entry {}", path, args.len(), entry);
                Ok(PreparedImage {
                    space,
                    entry,
                    sp,
                    argc: args.len(),
                })
            }
            Err(errno) => {
                self.platform.as_destroy(space);
                Err(errno)
            }
        }
    }

    fn load_into(
        &self,
        space: &P::Space,
        path: &str,
        args: &[Vec<u8>],
    ) -> Result<(UserAddr, UserAddr), Errno> {
        let entry = self.platform.load_image(space, path)?;
        let mut sp = self.platform.as_define_stack(space)?;

        let mut pointers = Vec::with_capacity(args.len() + 1);
        for arg in args {
            sp = sp.sub(round_up(arg.len() + 1, ARGV_ALIGN));
            self.platform.copy_out_str(space, sp, arg)?;
            pointers.push(sp);
        }
        pointers.push(UserAddr::NULL);

        for ptr in pointers.iter().rev() {
            sp = sp.sub(USER_PTR_SIZE);
            self.platform.copy_out_ptr(space, sp, *ptr)?;
        }
        Ok((entry, sp))
    }

    /// Point of no return: install the prepared space and enter it
    pub(crate) fn commit_image(&self, process: &ProcessRef<P>, image: PreparedImage<P::Space>) -> ! {
        let old = process.set_space(Some(Arc::clone(&image.space)));
        self.platform.as_activate(&image.space);
        if let Some(old) = old {
            self.platform.as_destroy(old);
        }

        debug!("PID {} entering new image at {}", process.pid(), image.entry);
        let tf = image.trap_frame();
        drop(image);
        self.platform.enter_user(tf)
    }
}

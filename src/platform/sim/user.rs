/*!
 * Simulated User Mode
 *
 * `UserCtx` is what a user program sees: its registers at entry, loads and
 * stores into its own address space, and syscall stubs that trap into the
 * kernel through the numbered ABI, exactly as a libc would.
 */

use super::space::SimSpace;
use crate::core::limits::{ARG_MAX, USER_PTR_SIZE, USER_SCRATCH_BASE};
use crate::core::types::{round_up, ContextId, ExitCode, Pid, UserAddr};
use crate::platform::{PlatformResult, TrapFrame, TrapHandler, SYSCALL_INSN_SIZE};
use crate::syscall::{Errno, SyscallNumber, WaitStatus};
use std::sync::Arc;

/// Scratch offset where syscall stubs stage strings and pointer arrays
const STAGING_OFFSET: usize = 64;

/// Execution state of a user program
pub struct UserCtx {
    handler: Arc<dyn TrapHandler>,
    context: ContextId,
    space: Arc<SimSpace>,
    entry: TrapFrame,
}

impl UserCtx {
    pub(super) fn new(
        handler: Arc<dyn TrapHandler>,
        context: ContextId,
        space: Arc<SimSpace>,
        entry: TrapFrame,
    ) -> Self {
        Self {
            handler,
            context,
            space,
            entry,
        }
    }

    /// Registers as they were when this code was entered
    pub fn registers(&self) -> &TrapFrame {
        &self.entry
    }

    /// Id of the address space this code runs in
    pub fn space_id(&self) -> u64 {
        self.space.id()
    }

    /// Scratch word used for the `waitpid` status
    pub fn status_addr(&self) -> UserAddr {
        USER_SCRATCH_BASE
    }

    pub fn peek(&self, addr: UserAddr, len: usize) -> PlatformResult<Vec<u8>> {
        self.space.read(addr, len)
    }

    pub fn poke(&self, addr: UserAddr, bytes: &[u8]) -> PlatformResult<()> {
        self.space.write(addr, bytes)
    }

    /// Argument vector passed at entry
    pub fn args(&self) -> Vec<String> {
        let argc = self.entry.args[0];
        let argv = UserAddr(self.entry.args[1]);

        (0..argc)
            .filter_map(|i| {
                let raw = self.space.read(argv.add(i * USER_PTR_SIZE), USER_PTR_SIZE).ok()?;
                let mut word = [0u8; USER_PTR_SIZE];
                word.copy_from_slice(&raw);
                let ptr = UserAddr(u64::from_le_bytes(word) as usize);
                let bytes = self.space.read_cstr(ptr, ARG_MAX).ok()?;
                Some(String::from_utf8_lossy(&bytes).into_owned())
            })
            .collect()
    }

    pub fn getpid(&mut self) -> Pid {
        // getpid cannot fail
        self.trap(SyscallNumber::Getpid, [0; 4], self.entry.epc)
            .map(|pid| pid as Pid)
            .unwrap_or_default()
    }

    /// Fork; the child runs `child` in its copy of this address space
    ///
    /// The continuation is installed as the instruction after the syscall,
    /// so the child resumes exactly where the parent trapped.
    pub fn fork<F>(&mut self, child: F) -> Result<Pid, Errno>
    where
        F: Fn(&mut UserCtx) -> ExitCode + Send + Sync + 'static,
    {
        let resume = self.space.register_code(Arc::new(child));
        let result = self.trap(SyscallNumber::Fork, [0; 4], resume.sub(SYSCALL_INSN_SIZE));
        // The child holds its own copy of the continuation by now
        self.space.unregister_code(resume);
        result.map(|pid| pid as Pid)
    }

    /// Wait for `pid` and decode its status
    pub fn waitpid(&mut self, pid: Pid) -> Result<(Pid, WaitStatus), Errno> {
        let status_addr = self.status_addr();
        let reaped = self.waitpid_raw(pid as usize, status_addr, 0)?;
        let raw = self
            .space
            .read(status_addr, 4)
            .map_err(|_| Errno::EFAULT)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&raw);
        Ok((reaped, WaitStatus::from_raw(i32::from_le_bytes(word))))
    }

    pub fn waitpid_raw(
        &mut self,
        pid: usize,
        status: UserAddr,
        options: i32,
    ) -> Result<Pid, Errno> {
        self.trap(
            SyscallNumber::Waitpid,
            [pid, status.as_usize(), options as u32 as usize, 0],
            self.entry.epc,
        )
        .map(|pid| pid as Pid)
    }

    /// Terminate with `code`
    pub fn exit(&mut self, code: ExitCode) -> ! {
        let _ = self.trap(SyscallNumber::Exit, [code as u32 as usize, 0, 0, 0], self.entry.epc);
        panic!("_exit returned to user mode");
    }

    /// Replace the image; only returns on failure
    pub fn execv(&mut self, path: &str, args: &[&str]) -> Errno {
        let mut cursor = USER_SCRATCH_BASE.add(STAGING_OFFSET);

        let Ok(path_addr) = self.stage_str(&mut cursor, path.as_bytes()) else {
            return Errno::EFAULT;
        };

        let mut pointers = Vec::with_capacity(args.len() + 1);
        for arg in args {
            match self.stage_str(&mut cursor, arg.as_bytes()) {
                Ok(addr) => pointers.push(addr),
                Err(_) => return Errno::EFAULT,
            }
        }
        pointers.push(UserAddr::NULL);

        let argv = UserAddr(round_up(cursor.as_usize(), USER_PTR_SIZE));
        for (i, ptr) in pointers.iter().enumerate() {
            let word = (ptr.as_usize() as u64).to_le_bytes();
            if self.space.write(argv.add(i * USER_PTR_SIZE), &word).is_err() {
                return Errno::EFAULT;
            }
        }

        self.execv_raw(path_addr, argv)
    }

    pub fn execv_raw(&mut self, path: UserAddr, argv: UserAddr) -> Errno {
        match self.trap(
            SyscallNumber::Execv,
            [path.as_usize(), argv.as_usize(), 0, 0],
            self.entry.epc,
        ) {
            Err(errno) => errno,
            Ok(_) => panic!("execv returned success to the old image"),
        }
    }

    fn stage_str(&self, cursor: &mut UserAddr, bytes: &[u8]) -> PlatformResult<UserAddr> {
        let addr = *cursor;
        let mut buf = Vec::with_capacity(bytes.len() + 1);
        buf.extend_from_slice(bytes);
        buf.push(0);
        self.space.write(addr, &buf)?;
        *cursor = addr.add(buf.len());
        Ok(addr)
    }

    /// Trap with an arbitrary call number
    pub fn syscall_raw(&mut self, callno: usize, args: [usize; 4]) -> Result<i64, Errno> {
        self.trap_raw(callno, args, self.entry.epc)
    }

    fn trap(
        &mut self,
        callno: SyscallNumber,
        args: [usize; 4],
        epc: UserAddr,
    ) -> Result<i64, Errno> {
        self.trap_raw(callno as usize, args, epc)
    }

    fn trap_raw(&mut self, callno: usize, args: [usize; 4], epc: UserAddr) -> Result<i64, Errno> {
        let mut tf = TrapFrame::syscall(callno, args, epc, self.entry.sp);
        self.handler.syscall(self.context, &mut tf);
        if tf.failed() {
            Err(Errno::from_code(tf.errno).unwrap_or(Errno::ENOSYS))
        } else {
            Ok(tf.retval)
        }
    }
}

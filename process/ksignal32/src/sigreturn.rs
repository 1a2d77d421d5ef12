// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Return from an IA-32 signal handler.
use core::mem::offset_of;

use bytemuck::{AnyBitPattern, NoUninit};
use linux_raw_sys::general::SIGSEGV;
use osvm::{Access, UserPtr, VirtMemIo};

use crate::{
    CompatSigSet, CompatTask, FpState32, RestartBlock, RtSigFrame32, SigContext32, SigError,
    SigFrame32, SigResult, SignalHost, SignalSet, TrapFrame, compat_access_ok,
    config::COMPAT_NSIG_WORDS, merge_eflags, restore_fpstate,
};

impl<M: VirtMemIo, H: SignalHost> CompatTask<M, H> {
    /// Restores the registers saved in `sc`, returning the saved `eax`.
    ///
    /// The extended state behind `sc.fpstate` is read before any register is
    /// touched, so a bad pointer leaves `regs` intact.
    pub fn restore_sigcontext(
        &mut self,
        regs: &mut TrapFrame,
        sc: &SigContext32,
    ) -> SigResult<u32> {
        self.restart_block = RestartBlock::NoRestart;

        let fpstate = match UserPtr::<FpState32>::new(sc.fpstate as usize).check_non_null() {
            Some(ptr) => {
                let addr = ptr.addr() as u64;
                if !compat_access_ok(&self.mem, addr, size_of::<FpState32>(), Access::Read) {
                    return Err(SigError::BadAddress);
                }
                Some(ptr.read_vm(&self.mem)?)
            }
            None => None,
        };

        sc.restore_regs(regs);
        self.host.load_segment_descriptors(regs);
        self.arch.eflag = merge_eflags(self.arch.eflag, sc.eflags);
        // No restart check on the way out.
        regs.r1 = u64::MAX;

        if let Some(save) = fpstate {
            restore_fpstate(&save, regs, &mut self.arch);
        }
        Ok(sc.eax)
    }

    fn read_frame<T: AnyBitPattern + NoUninit>(&self, addr: u64) -> SigResult<T> {
        if !compat_access_ok(&self.mem, addr, size_of::<T>(), Access::Read) {
            return Err(SigError::BadAddress);
        }
        Ok(UserPtr::<T>::new(addr as usize).read_vm(&self.mem)?)
    }

    fn badframe(&self, what: &str, addr: u64, err: SigError) -> isize {
        warn!("{what}: bad frame at {addr:#x}: {err}");
        self.host.force_sig(SIGSEGV);
        0
    }

    fn do_sigreturn(&mut self, regs: &mut TrapFrame, addr: u64) -> SigResult<u32> {
        let frame: SigFrame32 = self.read_frame(addr)?;
        let mut words: CompatSigSet = [0; COMPAT_NSIG_WORDS];
        words[0] = frame.sc.oldmask;
        words[1..].copy_from_slice(&frame.extramask);
        self.set_blocked(SignalSet::from_compat(words).blockable());
        self.restore_sigcontext(regs, &frame.sc)
    }

    fn do_rt_sigreturn(&mut self, regs: &mut TrapFrame, addr: u64, esp: u64) -> SigResult<u32> {
        let frame: RtSigFrame32 = self.read_frame(addr)?;
        self.set_blocked(SignalSet::from_compat(frame.uc.uc_sigmask).blockable());
        let eax = self.restore_sigcontext(regs, &frame.uc.uc_mcontext)?;
        if let Err(e) = self.do_sigaltstack(Some(frame.uc.uc_stack), esp) {
            debug!("rt_sigreturn: alternate stack kept: {e}");
        }
        Ok(eax)
    }
}

/// `sigreturn(2)` for a plain frame.
///
/// Returns the restored `eax`. A bad frame forces SIGSEGV and returns 0.
pub fn sys32_sigreturn<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    regs: &mut TrapFrame,
) -> isize {
    let esp = regs.r12 as u32 as u64;
    // The handler's `ret` and the trampoline's `popl` consumed the first two
    // words.
    let addr = esp.wrapping_sub(offset_of!(SigFrame32, sc) as u64);
    match task.do_sigreturn(regs, addr) {
        Ok(eax) => {
            trace!("sys32_sigreturn => frame {addr:#x}, eax {eax:#x}");
            eax as i32 as isize
        }
        Err(e) => task.badframe("sys32_sigreturn", addr, e),
    }
}

/// `rt_sigreturn(2)` for a real-time frame.
///
/// Returns the restored `eax`. A bad frame forces SIGSEGV and returns 0.
pub fn sys32_rt_sigreturn<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    regs: &mut TrapFrame,
) -> isize {
    let esp = regs.r12 as u32 as u64;
    // Only the return address was consumed.
    let addr = esp.wrapping_sub(offset_of!(RtSigFrame32, sig) as u64);
    match task.do_rt_sigreturn(regs, addr, esp) {
        Ok(eax) => {
            trace!("sys32_rt_sigreturn => frame {addr:#x}, eax {eax:#x}");
            eax as i32 as isize
        }
        Err(e) => task.badframe("sys32_rt_sigreturn", addr, e),
    }
}

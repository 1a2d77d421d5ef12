// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! IA-32 signal frame layout and construction.
//!
//! Frames are assembled in kernel memory and stored with a single user
//! write after the whole region passed the access check, so a failed
//! delivery never leaves a partial frame behind.
use core::mem::offset_of;

use bytemuck::{Pod, Zeroable};
use osvm::{Access, UserPtr, VirtMemIo};

use crate::{
    AddrLimit, CompatSigInfo, CompatSigSet, CompatTask, FpState32, SaFlags, SigContext32,
    SignalAction, SignalHost, SignalInfo, SignalSet, StackT32, TrapFrame,
    api::Sysno32,
    config::{COMPAT_NSIG_WORDS, COMPAT_USER_LIMIT, GATE_RT_SIGRETURN, GATE_SIGRETURN},
    save_fpstate,
};

/// Address returned by [`get_sigframe`] when the alternate stack would
/// overflow. It never passes an access check.
pub const BAD_FRAME: u64 = u64::MAX;

/// `popl %eax; movl $__NR_sigreturn, %eax; int $0x80`
pub const SIGRETURN_CODE: [u8; 8] = {
    let nr = (Sysno32::sigreturn as u32).to_le_bytes();
    [0x58, 0xb8, nr[0], nr[1], nr[2], nr[3], 0xcd, 0x80]
};

/// `movl $__NR_rt_sigreturn, %eax; int $0x80`
pub const RT_SIGRETURN_CODE: [u8; 8] = {
    let nr = (Sysno32::rt_sigreturn as u32).to_le_bytes();
    [0xb8, nr[0], nr[1], nr[2], nr[3], 0xcd, 0x80, 0]
};

/// Frame of a handler installed without `SA_SIGINFO`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SigFrame32 {
    pub pretcode: u32,
    pub sig: u32,
    pub sc: SigContext32,
    pub fpstate: FpState32,
    /// Mask words past the first, which lives in `sc.oldmask`.
    pub extramask: [u32; COMPAT_NSIG_WORDS - 1],
    pub retcode: [u8; 8],
}

/// IA-32 `struct ucontext`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UContext32 {
    pub uc_flags: u32,
    pub uc_link: u32,
    pub uc_stack: StackT32,
    pub uc_mcontext: SigContext32,
    pub uc_sigmask: CompatSigSet,
}

impl UContext32 {
    /// Build a user context around `mcontext`.
    pub fn new(mcontext: SigContext32, stack: StackT32, sigmask: SignalSet) -> Self {
        Self {
            uc_flags: 0,
            uc_link: 0,
            uc_stack: stack,
            uc_mcontext: mcontext,
            uc_sigmask: sigmask.to_compat(),
        }
    }
}

/// Frame of a handler installed with `SA_SIGINFO`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct RtSigFrame32 {
    pub pretcode: u32,
    pub sig: u32,
    /// Points at `info`.
    pub pinfo: u32,
    /// Points at `uc`.
    pub puc: u32,
    pub info: CompatSigInfo,
    pub uc: UContext32,
    pub fpstate: FpState32,
    pub retcode: [u8; 8],
}

/// Checks that `[addr, addr + len)` is accessible and inside the IA-32
/// address space.
pub fn compat_access_ok<M: VirtMemIo + ?Sized>(
    mem: &M,
    addr: u64,
    len: usize,
    access: Access,
) -> bool {
    addr.checked_add(len as u64)
        .is_some_and(|end| end <= COMPAT_USER_LIMIT)
        && mem.access_ok(addr as usize, len, access)
}

impl<M: VirtMemIo, H: SignalHost> CompatTask<M, H> {
    /// Picks the address of a `frame_size` byte frame.
    ///
    /// The result satisfies the IA-32 entry contract `(sp + 4) % 16 == 0`,
    /// or is [`BAD_FRAME`] if the alternate stack would overflow.
    pub fn get_sigframe(&self, action: &SignalAction, regs: &TrapFrame, frame_size: usize) -> u64 {
        let mut esp = regs.r12 as u32 as u64;
        let size = frame_size as u64;

        let mut on_alt = false;
        if action.flags.contains(SaFlags::ONSTACK) {
            if self.sas_ss_flags(esp) == 0 {
                esp = self.sas.sp + self.sas.size;
            } else {
                on_alt = self.on_sig_stack(esp);
            }
        }

        let frame = (esp.wrapping_sub(size).wrapping_add(4) & !15).wrapping_sub(4);
        // Alignment may push the frame below the base of the alternate stack.
        if on_alt && !self.on_sig_stack(frame) {
            return BAD_FRAME;
        }
        frame
    }

    /// Captures the register and floating-point state for a frame at `fpstate`.
    ///
    /// The live registers stay untouched; the returned status word with its
    /// exception state cleared is committed by [`Self::enter_handler`].
    fn setup_sigcontext(
        &self,
        regs: &TrapFrame,
        fpstate: u32,
        mask: SignalSet,
    ) -> (SigContext32, FpState32, u64) {
        let mut sc = SigContext32::capture(regs, self.arch.eflag);
        sc.fpstate = fpstate;
        sc.oldmask = mask.to_compat()[0];
        let mut arch = self.arch.clone();
        let fp = save_fpstate(regs, &mut arch);
        (sc, fp, arch.fsr)
    }

    fn pretcode(action: &SignalAction, gate: u32) -> u32 {
        if action.flags.contains(SaFlags::RESTORER) {
            action.compat_restorer()
        } else {
            gate
        }
    }

    /// Hands control to the handler of `action` once the frame at `frame` is
    /// in place.
    fn enter_handler(
        &mut self,
        regs: &mut TrapFrame,
        action: &SignalAction,
        frame: u64,
        fsr: u64,
    ) {
        self.arch.fsr = fsr;
        regs.r12 = frame;
        regs.cr_iip = action.compat_handler() as u64;
        self.addr_limit = AddrLimit::User;
    }

    /// Builds a plain frame for `sig`, saving `set` as the mask to restore.
    ///
    /// Returns the frame address, or `None` if SIGSEGV was forced instead.
    pub fn setup_frame(
        &mut self,
        sig: u32,
        action: &SignalAction,
        set: SignalSet,
        regs: &mut TrapFrame,
    ) -> Option<u32> {
        let addr = self.get_sigframe(action, regs, size_of::<SigFrame32>());
        if !compat_access_ok(&self.mem, addr, size_of::<SigFrame32>(), Access::Write) {
            warn!("sig {sig}: no room for frame at {addr:#x}");
            self.force_sigsegv(sig);
            return None;
        }

        let fpstate = addr as u32 + offset_of!(SigFrame32, fpstate) as u32;
        let (sc, fp, fsr) = self.setup_sigcontext(regs, fpstate, set);
        let mut extramask = [0; COMPAT_NSIG_WORDS - 1];
        extramask.copy_from_slice(&set.to_compat()[1..]);
        let frame = SigFrame32 {
            pretcode: Self::pretcode(action, GATE_SIGRETURN),
            sig: self.map_signal(sig),
            sc,
            fpstate: fp,
            extramask,
            retcode: SIGRETURN_CODE,
        };

        if let Err(e) = UserPtr::<SigFrame32>::new(addr as usize).write_vm(&mut self.mem, &frame) {
            warn!("sig {sig}: cannot store frame at {addr:#x}: {e:?}");
            self.force_sigsegv(sig);
            return None;
        }

        self.enter_handler(regs, action, addr, fsr);
        trace!(
            "sig {sig}: frame at {addr:#x}, handler {:#x}, ret {:#x}",
            regs.cr_iip, frame.pretcode
        );
        Some(addr as u32)
    }

    /// Builds a real-time frame for `sig` carrying `info`.
    ///
    /// Returns the frame address, or `None` if SIGSEGV was forced instead.
    pub fn setup_rt_frame(
        &mut self,
        sig: u32,
        action: &SignalAction,
        info: &SignalInfo,
        set: SignalSet,
        regs: &mut TrapFrame,
    ) -> Option<u32> {
        let addr = self.get_sigframe(action, regs, size_of::<RtSigFrame32>());
        if !compat_access_ok(&self.mem, addr, size_of::<RtSigFrame32>(), Access::Write) {
            warn!("sig {sig}: no room for rt frame at {addr:#x}");
            self.force_sigsegv(sig);
            return None;
        }

        let base = addr as u32;
        let fpstate = base + offset_of!(RtSigFrame32, fpstate) as u32;
        let stack = StackT32 {
            ss_sp: self.sas.sp as u32,
            ss_flags: self.sas_ss_flags(regs.r12) as i32,
            ss_size: self.sas.size as u32,
        };
        let (sc, fp, fsr) = self.setup_sigcontext(regs, fpstate, set);
        let frame = RtSigFrame32 {
            pretcode: Self::pretcode(action, GATE_RT_SIGRETURN),
            sig: self.map_signal(sig),
            pinfo: base + offset_of!(RtSigFrame32, info) as u32,
            puc: base + offset_of!(RtSigFrame32, uc) as u32,
            info: info.to_compat(),
            uc: UContext32::new(sc, stack, set),
            fpstate: fp,
            retcode: RT_SIGRETURN_CODE,
        };

        if let Err(e) = UserPtr::<RtSigFrame32>::new(addr as usize).write_vm(&mut self.mem, &frame)
        {
            warn!("sig {sig}: cannot store rt frame at {addr:#x}: {e:?}");
            self.force_sigsegv(sig);
            return None;
        }

        self.enter_handler(regs, action, addr, fsr);
        trace!(
            "sig {sig}: rt frame at {addr:#x}, handler {:#x}, ret {:#x}",
            regs.cr_iip, frame.pretcode
        );
        Some(base)
    }

    /// Delivers `sig` to the handler of `action`, picking the frame kind
    /// from `SA_SIGINFO`.
    pub fn setup_frame1(
        &mut self,
        sig: u32,
        action: &SignalAction,
        info: &SignalInfo,
        set: SignalSet,
        regs: &mut TrapFrame,
    ) -> Option<u32> {
        if action.flags.contains(SaFlags::SIGINFO) {
            self.setup_rt_frame(sig, action, info, set, regs)
        } else {
            self.setup_frame(sig, action, set, regs)
        }
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Per-task signal state touched by the compat path.
use linux_raw_sys::general::{
    SIG_BLOCK, SIG_SETMASK, SIG_UNBLOCK, SIGSEGV, SS_DISABLE, SS_ONSTACK,
};
use osvm::VirtMemIo;
use spin::Mutex;

use crate::{
    ArchRegs, ExecDomain, SigError, SigResult, SignalAction, SignalInfo, SignalSet, SignalStack,
    StackT32, TrapFrame, config::COMPAT_MINSIGSTKSZ,
};

/// Services of the generic signal and scheduling code.
pub trait SignalHost {
    /// Recomputes pending-signal state after the blocked set changed.
    ///
    /// Called with the task's signal lock held; must not block.
    fn recalc_sigpending(&self, blocked: SignalSet);

    /// Delivers `sig` regardless of the blocked set.
    fn force_sig(&self, sig: u32);

    /// Sleeps interruptibly until a signal is pending.
    fn schedule_interruptible(&self);

    /// Installs `act` for `sig` if given, returning the previous action.
    fn do_sigaction(&self, sig: u32, act: Option<&SignalAction>) -> SigResult<SignalAction>;

    /// Queues `info` for process `pid`.
    fn sigqueueinfo(&self, pid: i32, sig: u32, info: &SignalInfo) -> SigResult<isize>;

    /// Reloads segment descriptors after the selectors in `regs` changed.
    fn load_segment_descriptors(&self, _regs: &TrapFrame) {}
}

/// Blocked-set bookkeeping guarded by the task's signal lock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SigMaskState {
    pub blocked: SignalSet,
    /// Blocked set to restore once a suspended call delivered its signal.
    pub saved: SignalSet,
    pub restore_saved: bool,
}

/// Address limit for user copies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AddrLimit {
    #[default]
    User,
    Kernel,
}

/// How an interrupted restartable syscall resumes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RestartBlock {
    #[default]
    Resume,
    /// The syscall fails with `EINTR` instead.
    NoRestart,
}

/// An IA-32 task as seen by the compat signal path.
///
/// All state is reached through this object rather than a global "current
/// task"; the caller owns it for the duration of one delivery or return.
pub struct CompatTask<M, H> {
    /// The task's user address space.
    pub mem: M,
    pub host: H,
    /// Live registers not saved on trap entry.
    pub arch: ArchRegs,
    /// Alternate signal stack.
    pub sas: SignalStack,
    pub exec_domain: Option<ExecDomain>,
    pub addr_limit: AddrLimit,
    pub restart_block: RestartBlock,
    sigmask: Mutex<SigMaskState>,
}

impl<M: VirtMemIo, H: SignalHost> CompatTask<M, H> {
    pub fn new(mem: M, host: H) -> Self {
        Self {
            mem,
            host,
            arch: ArchRegs::default(),
            sas: SignalStack::default(),
            exec_domain: None,
            addr_limit: AddrLimit::User,
            restart_block: RestartBlock::Resume,
            sigmask: Mutex::new(SigMaskState::default()),
        }
    }

    /// Snapshot of the blocked-set bookkeeping.
    pub fn sigmask_state(&self) -> SigMaskState {
        *self.sigmask.lock()
    }

    pub fn blocked(&self) -> SignalSet {
        self.sigmask.lock().blocked
    }

    /// Replaces the blocked set and recomputes pending state.
    pub fn set_blocked(&self, set: SignalSet) {
        let mut state = self.sigmask.lock();
        state.blocked = set;
        self.host.recalc_sigpending(set);
    }

    /// Applies a `sigprocmask` operation, returning the previous blocked set.
    ///
    /// SIGKILL and SIGSTOP are dropped from `set`.
    pub fn sigprocmask(&self, how: u32, set: Option<SignalSet>) -> SigResult<SignalSet> {
        let mut state = self.sigmask.lock();
        let old = state.blocked;
        if let Some(set) = set {
            let set = set.blockable();
            state.blocked = match how {
                SIG_BLOCK => old | set,
                SIG_UNBLOCK => old & !set,
                SIG_SETMASK => set,
                _ => return Err(SigError::InvalidInput),
            };
            self.host.recalc_sigpending(state.blocked);
        }
        Ok(old)
    }

    /// Installs a temporary blocked set, remembering the current one.
    pub fn suspend_with(&self, mask: SignalSet) {
        let mut state = self.sigmask.lock();
        state.saved = state.blocked;
        state.blocked = mask;
        self.host.recalc_sigpending(mask);
    }

    /// Asks the delivery path to restore the saved blocked set.
    pub fn set_restore_sigmask(&self) {
        self.sigmask.lock().restore_saved = true;
    }

    /// Whether `sp` lies on the alternate signal stack.
    pub fn on_sig_stack(&self, sp: u64) -> bool {
        sp.wrapping_sub(self.sas.sp) < self.sas.size
    }

    /// `SS_DISABLE`, `SS_ONSTACK` or 0 for the stack pointer `sp`.
    pub fn sas_ss_flags(&self, sp: u64) -> u32 {
        if self.sas.size == 0 {
            SS_DISABLE
        } else if self.on_sig_stack(sp) {
            SS_ONSTACK
        } else {
            0
        }
    }

    /// Reads and optionally replaces the alternate signal stack.
    ///
    /// Returns the previous descriptor as seen from `sp`.
    pub fn do_sigaltstack(&mut self, ss: Option<StackT32>, sp: u64) -> SigResult<StackT32> {
        let old = StackT32 {
            ss_sp: self.sas.sp as u32,
            ss_flags: self.sas_ss_flags(sp) as i32,
            ss_size: self.sas.size as u32,
        };
        let Some(ss) = ss else {
            return Ok(old);
        };

        if self.on_sig_stack(sp) {
            return Err(SigError::PermissionDenied);
        }
        let flags = ss.ss_flags as u32;
        if flags != SS_DISABLE && flags != SS_ONSTACK && flags != 0 {
            return Err(SigError::InvalidInput);
        }
        self.sas = if flags == SS_DISABLE {
            SignalStack::default()
        } else {
            if ss.ss_size < COMPAT_MINSIGSTKSZ {
                return Err(SigError::NoMemory);
            }
            SignalStack {
                sp: ss.ss_sp as u64,
                size: ss.ss_size as u64,
            }
        };
        Ok(old)
    }

    /// Signal number as the task's execution domain numbers it.
    pub fn map_signal(&self, sig: u32) -> u32 {
        self.exec_domain
            .as_ref()
            .map_or(sig, |domain| domain.map_signal(sig))
    }

    /// Kills the task with SIGSEGV after failing to deliver `sig`.
    ///
    /// A failing SIGSEGV handler is reset first so the task cannot loop.
    pub fn force_sigsegv(&self, sig: u32) {
        if sig == SIGSEGV {
            if let Err(e) = self.host.do_sigaction(SIGSEGV, Some(&SignalAction::default())) {
                warn!("cannot reset SIGSEGV handler: {e}");
            }
        }
        self.host.force_sig(SIGSEGV);
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Signal sets, actions and alternate stacks, native and IA-32 views.
use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use derive_more::{BitAnd, BitOr, Not};
use linux_raw_sys::general::{SIGKILL, SIGSTOP};

use crate::config::COMPAT_NSIG;

/// Native signal set: bit `n - 1` stands for signal `n`.
#[repr(transparent)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, BitAnd, BitOr, Not, Pod, Zeroable)]
pub struct SignalSet(u64);

impl SignalSet {
    /// Signals that can never be blocked.
    pub const UNBLOCKABLE: Self = Self(sigmask(SIGKILL) | sigmask(SIGSTOP));

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns whether `sig` is a member. Out-of-range numbers never are.
    pub fn has(self, sig: u32) -> bool {
        valid_signo(sig) && self.0 & sigmask(sig) != 0
    }

    /// Adds `sig`, returning whether it was newly added.
    pub fn add(&mut self, sig: u32) -> bool {
        if !valid_signo(sig) || self.has(sig) {
            return false;
        }
        self.0 |= sigmask(sig);
        true
    }

    /// Removes `sig`, returning whether it was present.
    pub fn remove(&mut self, sig: u32) -> bool {
        if !self.has(sig) {
            return false;
        }
        self.0 &= !sigmask(sig);
        true
    }

    /// Drops SIGKILL and SIGSTOP.
    pub const fn blockable(self) -> Self {
        Self(self.0 & !Self::UNBLOCKABLE.0)
    }

    /// Splits into the IA-32 word layout.
    pub const fn to_compat(self) -> CompatSigSet {
        [self.0 as u32, (self.0 >> 32) as u32]
    }

    pub const fn from_compat(words: CompatSigSet) -> Self {
        Self(words[0] as u64 | (words[1] as u64) << 32)
    }
}

const fn sigmask(sig: u32) -> u64 {
    1 << (sig - 1)
}

fn valid_signo(sig: u32) -> bool {
    (1..=COMPAT_NSIG as u32).contains(&sig)
}

bitflags! {
    /// `sa_flags` bits, identical in the native and IA-32 ABIs.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct SaFlags: u32 {
        const NOCLDSTOP = 0x0000_0001;
        const NOCLDWAIT = 0x0000_0002;
        const SIGINFO = 0x0000_0004;
        const RESTORER = 0x0400_0000;
        const ONSTACK = 0x0800_0000;
        const RESTART = 0x1000_0000;
        const NODEFER = 0x4000_0000;
        const RESETHAND = 0x8000_0000;
    }
}

impl SaFlags {
    /// Historical name of [`SaFlags::RESETHAND`].
    pub const ONESHOT: Self = Self::RESETHAND;
    /// Historical name of [`SaFlags::NODEFER`].
    pub const NOMASK: Self = Self::NODEFER;
}

/// Native signal action.
///
/// The native ABI has no restorer slot, so an IA-32 action keeps its
/// handler in the low and its restorer in the high half of `handler`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SignalAction {
    pub handler: u64,
    pub flags: SaFlags,
    pub mask: SignalSet,
}

impl SignalAction {
    /// Packs an IA-32 handler/restorer pair.
    ///
    /// `SIG_DFL`, `SIG_IGN` and `SIG_ERR` (0, 1, -1) are sign-extended so the
    /// generic signal path still recognizes them.
    pub fn set_compat_handler(&mut self, handler: u32, restorer: u32) {
        self.handler = if handler.wrapping_add(1) <= 2 {
            handler as i32 as i64 as u64
        } else {
            (restorer as u64) << 32 | handler as u64
        };
    }

    pub const fn compat_handler(&self) -> u32 {
        self.handler as u32
    }

    pub const fn compat_restorer(&self) -> u32 {
        (self.handler >> 32) as u32
    }
}

/// Native alternate signal stack descriptor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SignalStack {
    pub sp: u64,
    pub size: u64,
}

/// IA-32 `stack_t`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct StackT32 {
    pub ss_sp: u32,
    pub ss_flags: i32,
    pub ss_size: u32,
}

/// IA-32 `struct sigaction` as used by `rt_sigaction`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SigAction32 {
    pub sa_handler: u32,
    pub sa_flags: u32,
    pub sa_restorer: u32,
    pub sa_mask: CompatSigSet,
}

/// IA-32 `struct old_sigaction` as used by `sigaction`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct OldSigAction32 {
    pub sa_handler: u32,
    pub sa_mask: u32,
    pub sa_flags: u32,
    pub sa_restorer: u32,
}

/// Execution domain of a personality that renumbers signals.
#[derive(Debug, Clone)]
pub struct ExecDomain {
    /// Native to personality numbering for the first 32 signals.
    pub signal_invmap: [u8; 32],
}

impl ExecDomain {
    /// Maps a native signal number to the number the task expects.
    pub fn map_signal(&self, sig: u32) -> u32 {
        match self.signal_invmap.get(sig as usize) {
            Some(&mapped) => mapped as u32,
            None => sig,
        }
    }
}

/// IA-32 `sigset_t` words, low signals first.
pub type CompatSigSet = [u32; crate::config::COMPAT_NSIG_WORDS];

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Handler installation and the alternate signal stack.
use osvm::{UserPtr, VirtMemIo};

use super::{copy_from_user, copy_to_user};
use crate::{
    CompatSigSet, CompatTask, OldSigAction32, SaFlags, SigAction32, SigError, SigResult,
    SignalAction, SignalHost, SignalSet, StackT32, TrapFrame,
};

/// Installs a one-shot, non-masking handler. Returns the old handler.
pub fn sys32_signal<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    sig: u32,
    handler: u32,
) -> SigResult<isize> {
    debug!("sys32_signal <= sig: {sig}, handler: {handler:#x}");
    let mut action = SignalAction {
        flags: SaFlags::ONESHOT | SaFlags::NOMASK,
        mask: SignalSet::empty(),
        ..Default::default()
    };
    action.set_compat_handler(handler, 0);
    let old = task.host.do_sigaction(sig, Some(&action))?;
    Ok(old.compat_handler() as isize)
}

/// `sigaction(2)` with the one-word mask layout.
pub fn sys32_sigaction<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    sig: u32,
    act: UserPtr<OldSigAction32>,
    oact: UserPtr<OldSigAction32>,
) -> SigResult<isize> {
    debug!("sys32_sigaction <= sig: {sig}, act: {act:?}, oact: {oact:?}");
    let new = match act.check_non_null() {
        Some(act) => {
            let act = copy_from_user(&task.mem, act)?;
            let mut action = SignalAction {
                flags: SaFlags::from_bits_retain(act.sa_flags),
                mask: SignalSet::from_bits(act.sa_mask as u64),
                ..Default::default()
            };
            action.set_compat_handler(act.sa_handler, act.sa_restorer);
            Some(action)
        }
        None => None,
    };

    let old = task.host.do_sigaction(sig, new.as_ref())?;

    if let Some(oact) = oact.check_non_null() {
        let old = OldSigAction32 {
            sa_handler: old.compat_handler(),
            sa_mask: old.mask.to_compat()[0],
            sa_flags: old.flags.bits(),
            sa_restorer: old.compat_restorer(),
        };
        copy_to_user(&mut task.mem, oact, &old)?;
    }
    Ok(0)
}

/// `rt_sigaction(2)`. Only the full 8-byte IA-32 signal set is accepted.
pub fn sys32_rt_sigaction<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    sig: u32,
    act: UserPtr<SigAction32>,
    oact: UserPtr<SigAction32>,
    sigsetsize: u32,
) -> SigResult<isize> {
    debug!(
        "sys32_rt_sigaction <= sig: {sig}, act: {act:?}, oact: {oact:?}, sigsetsize: {sigsetsize}"
    );
    if sigsetsize as usize != size_of::<CompatSigSet>() {
        return Err(SigError::InvalidInput);
    }

    let new = match act.check_non_null() {
        Some(act) => {
            let act = copy_from_user(&task.mem, act)?;
            let mut action = SignalAction {
                flags: SaFlags::from_bits_retain(act.sa_flags),
                mask: SignalSet::from_compat(act.sa_mask),
                ..Default::default()
            };
            action.set_compat_handler(act.sa_handler, act.sa_restorer);
            Some(action)
        }
        None => None,
    };

    let old = task.host.do_sigaction(sig, new.as_ref())?;

    if let Some(oact) = oact.check_non_null() {
        let old = SigAction32 {
            sa_handler: old.compat_handler(),
            sa_flags: old.flags.bits(),
            sa_restorer: old.compat_restorer(),
            sa_mask: old.mask.to_compat(),
        };
        copy_to_user(&mut task.mem, oact, &old)?;
    }
    Ok(0)
}

/// `sigaltstack(2)` with the IA-32 `stack_t`.
pub fn sys32_sigaltstack<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    regs: &TrapFrame,
    uss: UserPtr<StackT32>,
    uoss: UserPtr<StackT32>,
) -> SigResult<isize> {
    debug!("sys32_sigaltstack <= uss: {uss:?}, uoss: {uoss:?}");
    let ss = match uss.check_non_null() {
        Some(uss) => Some(copy_from_user(&task.mem, uss)?),
        None => None,
    };
    let old = task.do_sigaltstack(ss, regs.r12 as u32 as u64)?;
    if let Some(uoss) = uoss.check_non_null() {
        copy_to_user(&mut task.mem, uoss, &old)?;
    }
    Ok(0)
}

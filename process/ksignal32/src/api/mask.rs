// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Blocked-set syscalls and signal queueing.
use osvm::{Access, UserPtr, VirtMemIo};

use crate::{
    CompatSigInfo, CompatTask, SigError, SigResult, SignalHost, SignalSet, compat_access_ok,
    copy_siginfo_from_user32,
};

/// Blocks with the one-word `mask` until a signal arrives.
///
/// Always fails with `ERESTARTNOHAND`; the delivery path restores the
/// previous blocked set once the handler frame is built.
pub fn sys32_sigsuspend<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    mask: u32,
) -> SigResult<isize> {
    debug!("sys32_sigsuspend <= mask: {mask:#x}");
    task.suspend_with(SignalSet::from_bits(mask as u64).blockable());
    task.host.schedule_interruptible();
    task.set_restore_sigmask();
    Err(SigError::RestartNoHand)
}

/// `rt_sigprocmask(2)`.
///
/// `sigsetsize` may be shorter than the full set; missing bytes read as
/// zero and only `sigsetsize` bytes of the old set are stored.
pub fn sys32_rt_sigprocmask<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    how: u32,
    set: UserPtr<SignalSet>,
    oset: UserPtr<SignalSet>,
    sigsetsize: u32,
) -> SigResult<isize> {
    debug!(
        "sys32_rt_sigprocmask <= how: {how}, set: {set:?}, oset: {oset:?}, sigsetsize: {sigsetsize}"
    );
    let len = sigsetsize as usize;
    if len > size_of::<SignalSet>() {
        return Err(SigError::InvalidInput);
    }

    let new = match set.check_non_null() {
        Some(set) => {
            let mut bytes = [0u8; size_of::<SignalSet>()];
            if !compat_access_ok(&task.mem, set.addr() as u64, len, Access::Read) {
                return Err(SigError::BadAddress);
            }
            task.mem.read_mem(set.addr(), &mut bytes[..len])?;
            Some(SignalSet::from_bits(u64::from_le_bytes(bytes)))
        }
        None => None,
    };

    let old = task.sigprocmask(how, new)?;

    if let Some(oset) = oset.check_non_null() {
        if !compat_access_ok(&task.mem, oset.addr() as u64, len, Access::Write) {
            return Err(SigError::BadAddress);
        }
        task.mem
            .write_mem(oset.addr(), &old.bits().to_le_bytes()[..len])?;
    }
    Ok(0)
}

/// Queues the IA-32 `siginfo` at `uinfo` for `pid`.
pub fn sys32_rt_sigqueueinfo<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    pid: i32,
    sig: u32,
    uinfo: UserPtr<CompatSigInfo>,
) -> SigResult<isize> {
    debug!("sys32_rt_sigqueueinfo <= pid: {pid}, sig: {sig}, uinfo: {uinfo:?}");
    let info = copy_siginfo_from_user32(&task.mem, uinfo)?;
    task.host.sigqueueinfo(pid, sig, &info)
}

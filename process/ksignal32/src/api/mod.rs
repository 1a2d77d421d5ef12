// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! IA-32 signal syscalls.
mod action;
mod mask;

pub use action::*;
use bytemuck::{AnyBitPattern, NoUninit};
pub use mask::*;
use osvm::{Access, UserPtr, VirtMemIo};
use strum::FromRepr;

use crate::{
    CompatTask, SigError, SigResult, SignalHost, TrapFrame, compat_access_ok, sys32_rt_sigreturn,
    sys32_sigreturn,
};

/// IA-32 numbers of the signal syscalls.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum Sysno32 {
    signal = 48,
    sigaction = 67,
    sigsuspend = 72,
    sigreturn = 119,
    rt_sigreturn = 173,
    rt_sigaction = 174,
    rt_sigprocmask = 175,
    rt_sigqueueinfo = 178,
    sigaltstack = 186,
}

fn copy_from_user<M: VirtMemIo, T: AnyBitPattern + NoUninit>(mem: &M, ptr: UserPtr<T>) -> SigResult<T> {
    if !compat_access_ok(mem, ptr.addr() as u64, size_of::<T>(), Access::Read) {
        return Err(SigError::BadAddress);
    }
    Ok(ptr.read_vm(mem)?)
}

fn copy_to_user<M: VirtMemIo, T: NoUninit>(mem: &mut M, ptr: UserPtr<T>, val: &T) -> SigResult {
    if !compat_access_ok(mem, ptr.addr() as u64, size_of::<T>(), Access::Write) {
        return Err(SigError::BadAddress);
    }
    Ok(ptr.write_vm(mem, val)?)
}

fn uptr<T>(arg: u32) -> UserPtr<T> {
    UserPtr::new(arg as usize)
}

fn ret(res: SigResult<isize>) -> isize {
    res.unwrap_or_else(|e| e.as_ret())
}

/// Runs IA-32 syscall `sysno` if it is a signal syscall.
///
/// The result is stored in `eax`, which is also where the sigreturn calls
/// put the interrupted context's `eax` back. Returns `None` for numbers
/// this crate does not handle.
pub fn handle_compat_syscall<M: VirtMemIo, H: SignalHost>(
    task: &mut CompatTask<M, H>,
    regs: &mut TrapFrame,
    sysno: u32,
    args: [u32; 6],
) -> Option<isize> {
    let sysno = Sysno32::from_repr(sysno)?;
    let result = match sysno {
        Sysno32::signal => ret(sys32_signal(task, args[0], args[1])),
        Sysno32::sigaction => ret(sys32_sigaction(task, args[0], uptr(args[1]), uptr(args[2]))),
        Sysno32::sigsuspend => ret(sys32_sigsuspend(task, args[2])),
        Sysno32::sigreturn => sys32_sigreturn(task, regs),
        Sysno32::rt_sigreturn => sys32_rt_sigreturn(task, regs),
        Sysno32::rt_sigaction => {
            ret(sys32_rt_sigaction(task, args[0], uptr(args[1]), uptr(args[2]), args[3]))
        }
        Sysno32::rt_sigprocmask => ret(sys32_rt_sigprocmask(
            task,
            args[0],
            uptr(args[1]),
            uptr(args[2]),
            args[3],
        )),
        Sysno32::rt_sigqueueinfo => {
            ret(sys32_rt_sigqueueinfo(task, args[0] as i32, args[1], uptr(args[2])))
        }
        Sysno32::sigaltstack => ret(sys32_sigaltstack(task, regs, uptr(args[0]), uptr(args[1]))),
    };
    regs.r8 = result as u32 as u64;
    Some(result)
}

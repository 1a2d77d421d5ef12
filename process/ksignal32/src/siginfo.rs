// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Native and IA-32 `siginfo` records and the conversion between them.
//!
//! Only the three leading integers and the union member selected by
//! `si_code` cross the boundary; padding never does.
use core::fmt;

use bytemuck::{AnyBitPattern, NoUninit, Pod, Zeroable};
use osvm::{Access, UserPtr, VirtMemIo};
use strum::FromRepr;

use crate::{SigError, SigResult};

/// Size of the native payload union.
pub const SI_PAD_SIZE: usize = 128 - 4 * size_of::<i32>();
/// Size of the IA-32 payload union.
pub const COMPAT_SI_PAD_SIZE: usize = 128 - 3 * size_of::<i32>();

/// `si_code` of signals sent by `kill`.
pub const SI_USER: i32 = 0;
/// `si_code` of signals raised by the kernel itself.
pub const SI_KERNEL: i32 = 0x80;

/// Payload class carried in the upper half of an in-kernel `si_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u16)]
pub enum SigClass {
    Kill = 0,
    Timer = 1,
    Poll = 2,
    Fault = 3,
    Chld = 4,
    Rt = 5,
    Mesgq = 6,
}

impl SigClass {
    /// Builds an in-kernel `si_code` of this class.
    pub const fn code(self, low: u16) -> i32 {
        (self as i32) << 16 | low as i32
    }

    /// Payloads of this class are only produced by the kernel and have no
    /// IA-32 to native rule beyond the sender identity.
    pub const fn is_encode_only(self) -> bool {
        matches!(self, Self::Timer)
    }
}

/// Union member selected by an `si_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigLayout {
    /// Negative codes: the payload is copied verbatim.
    Opaque,
    Known(SigClass),
    /// A class outside the closed set.
    Unknown(u16),
}

impl SigLayout {
    pub fn of(code: i32) -> Self {
        if code < 0 {
            return Self::Opaque;
        }
        let class = (code >> 16) as u16;
        SigClass::from_repr(class).map_or(Self::Unknown(class), Self::Known)
    }
}

fn get<T: AnyBitPattern>(fields: &[u8], off: usize) -> T {
    bytemuck::pod_read_unaligned(&fields[off..off + size_of::<T>()])
}

fn put<T: NoUninit>(fields: &mut [u8], off: usize, val: T) {
    fields[off..off + size_of::<T>()].copy_from_slice(bytemuck::bytes_of(&val));
}

macro_rules! si_fields {
    ($($get:ident, $set:ident: $ty:ty = $off:expr;)*) => {
        $(
            pub fn $get(&self) -> $ty {
                get(&self.fields, $off)
            }

            pub fn $set(&mut self, val: $ty) {
                put(&mut self.fields, $off, val)
            }
        )*
    };
}

/// Native `siginfo_t`.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SignalInfo {
    pub signo: i32,
    pub errno: i32,
    pub code: i32,
    _pad0: i32,
    fields: [u8; SI_PAD_SIZE],
}

impl SignalInfo {
    pub fn new(signo: u32, code: i32) -> Self {
        Self {
            signo: signo as i32,
            code,
            ..Self::zeroed()
        }
    }

    /// A signal raised by the kernel without further detail.
    pub fn new_kernel(signo: u32) -> Self {
        Self::new(signo, SI_KERNEL)
    }

    /// A signal sent by `kill` from `pid`/`uid`.
    pub fn new_user(signo: u32, pid: i32, uid: u32) -> Self {
        let mut info = Self::new(signo, SI_USER);
        info.set_pid(pid);
        info.set_uid(uid);
        info
    }

    /// A fault at `addr`; `low` is the class-relative code (e.g. `SEGV_MAPERR`).
    pub fn new_fault(signo: u32, low: u16, addr: u64) -> Self {
        let mut info = Self::new(signo, SigClass::Fault.code(low));
        info.set_addr(addr);
        info
    }

    /// The raw payload union.
    pub fn pad(&self) -> &[u8; SI_PAD_SIZE] {
        &self.fields
    }

    pub fn pad_mut(&mut self) -> &mut [u8; SI_PAD_SIZE] {
        &mut self.fields
    }

    si_fields! {
        pid, set_pid: i32 = 0;
        uid, set_uid: u32 = 4;
        status, set_status: i32 = 8;
        utime, set_utime: i64 = 16;
        stime, set_stime: i64 = 24;
        addr, set_addr: u64 = 0;
        band, set_band: i64 = 0;
        fd, set_fd: i32 = 8;
        timer_id, set_timer_id: i32 = 0;
        overrun, set_overrun: i32 = 4;
        value_ptr, set_value_ptr: u64 = 8;
        value_int, set_value_int: i32 = 8;
    }

    /// Converts to the IA-32 layout.
    ///
    /// The code is narrowed to 16 bits; the class bits never reach the task.
    pub fn to_compat(&self) -> CompatSigInfo {
        let mut to = CompatSigInfo {
            signo: self.signo,
            errno: self.errno,
            code: self.code as i16 as i32,
            ..CompatSigInfo::zeroed()
        };
        match SigLayout::of(self.code) {
            SigLayout::Opaque => to.fields[..SI_PAD_SIZE].copy_from_slice(&self.fields),
            SigLayout::Known(SigClass::Chld) => {
                to.set_utime(self.utime() as i32);
                to.set_stime(self.stime() as i32);
                to.set_status(self.status());
                to.set_pid(self.pid());
                to.set_uid(self.uid());
            }
            SigLayout::Known(SigClass::Fault) => to.set_addr(self.addr() as u32),
            SigLayout::Known(SigClass::Poll) => {
                to.set_band(self.band() as i32);
                to.set_fd(self.fd());
            }
            SigLayout::Known(SigClass::Timer) => {
                to.set_timer_id(self.timer_id());
                to.set_overrun(self.overrun());
                to.set_value(self.value_ptr() as u32);
            }
            SigLayout::Known(SigClass::Rt | SigClass::Mesgq) => {
                to.set_uid(self.uid());
                to.set_pid(self.pid());
                to.set_value(self.value_ptr() as u32);
            }
            SigLayout::Known(SigClass::Kill) | SigLayout::Unknown(_) => {
                to.set_pid(self.pid());
                to.set_uid(self.uid());
            }
        }
        to
    }

    /// Converts from the IA-32 layout.
    ///
    /// Encode-only classes carry over the sender identity only; classes
    /// outside the closed set are rejected.
    pub fn from_compat(from: &CompatSigInfo) -> SigResult<Self> {
        let mut to = Self {
            signo: from.signo,
            errno: from.errno,
            code: from.code,
            ..Self::zeroed()
        };
        match SigLayout::of(from.code) {
            SigLayout::Opaque => to.fields.copy_from_slice(&from.fields[..SI_PAD_SIZE]),
            SigLayout::Known(SigClass::Chld) => {
                to.set_utime(from.utime() as i64);
                to.set_stime(from.stime() as i64);
                to.set_status(from.status());
                to.set_pid(from.pid());
                to.set_uid(from.uid());
            }
            SigLayout::Known(SigClass::Fault) => to.set_addr(from.addr() as u64),
            SigLayout::Known(SigClass::Poll) => {
                to.set_band(from.band() as i64);
                to.set_fd(from.fd());
            }
            SigLayout::Known(SigClass::Rt | SigClass::Mesgq) => {
                to.set_pid(from.pid());
                to.set_uid(from.uid());
                to.set_value_int(from.value() as i32);
            }
            SigLayout::Known(class @ (SigClass::Kill | SigClass::Timer)) => {
                if class.is_encode_only() {
                    debug!("siginfo class {class:?} from user, keeping sender only");
                }
                to.set_pid(from.pid());
                to.set_uid(from.uid());
            }
            SigLayout::Unknown(class) => {
                warn!("siginfo from user with unknown class {class:#x}");
                return Err(SigError::InvalidInput);
            }
        }
        Ok(to)
    }
}

impl fmt::Debug for SignalInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalInfo")
            .field("signo", &self.signo)
            .field("errno", &self.errno)
            .field("code", &format_args!("{:#x}", self.code))
            .finish_non_exhaustive()
    }
}

/// IA-32 `compat_siginfo_t`.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CompatSigInfo {
    pub signo: i32,
    pub errno: i32,
    pub code: i32,
    fields: [u8; COMPAT_SI_PAD_SIZE],
}

impl CompatSigInfo {
    pub fn pad(&self) -> &[u8; COMPAT_SI_PAD_SIZE] {
        &self.fields
    }

    pub fn pad_mut(&mut self) -> &mut [u8; COMPAT_SI_PAD_SIZE] {
        &mut self.fields
    }

    si_fields! {
        pid, set_pid: i32 = 0;
        uid, set_uid: u32 = 4;
        status, set_status: i32 = 8;
        utime, set_utime: i32 = 12;
        stime, set_stime: i32 = 16;
        addr, set_addr: u32 = 0;
        band, set_band: i32 = 0;
        fd, set_fd: i32 = 4;
        timer_id, set_timer_id: i32 = 0;
        overrun, set_overrun: i32 = 4;
        value, set_value: u32 = 8;
    }
}

impl fmt::Debug for CompatSigInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatSigInfo")
            .field("signo", &self.signo)
            .field("errno", &self.errno)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

/// Writes `info` to a task in IA-32 layout.
///
/// The whole destination is checked before anything is written.
pub fn copy_siginfo_to_user32<M: VirtMemIo + ?Sized>(
    mem: &mut M,
    to: UserPtr<CompatSigInfo>,
    info: &SignalInfo,
) -> SigResult {
    if !to.access_ok(mem, Access::Write) {
        return Err(SigError::BadAddress);
    }
    to.write_vm(mem, &info.to_compat())?;
    Ok(())
}

/// Reads an IA-32 `siginfo` from a task.
pub fn copy_siginfo_from_user32<M: VirtMemIo + ?Sized>(
    mem: &M,
    from: UserPtr<CompatSigInfo>,
) -> SigResult<SignalInfo> {
    if !from.access_ok(mem, Access::Read) {
        return Err(SigError::BadAddress);
    }
    SignalInfo::from_compat(&from.read_vm(mem)?)
}

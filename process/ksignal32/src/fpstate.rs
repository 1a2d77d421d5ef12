// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! IA-32 floating-point/SSE state image and its native mapping.
//!
//! | IA-32 field        | native source                             |
//! |--------------------|-------------------------------------------|
//! | `cw`               | `fcr` bits 0..12                          |
//! | `sw`, `status`     | `fsr` bits 0..15                          |
//! | `tag`              | `fsr` bits 16..31                         |
//! | `ipoff`, `cssel`   | `fir` bits 0..31, 32..47                  |
//! | `dataoff`, `datasel` | `fdr` bits 0..31, 32..47                |
//! | `mxcsr`            | `fcr` bits 39..47 and `fsr` bits 32..37   |
//! | `st[slot(i, top)]` | f8+i; f8-f11 from the trap frame          |
//! | `xmm[k]`           | f16+2k (low half), f17+2k (high half)     |
use bytemuck::{Pod, Zeroable};

use crate::{ArchRegs, TrapFrame};

/// x87 exception flags plus the busy bit, cleared before a handler runs.
const FSR_EXCEPTION_STATE: u64 = 0x80ff;
/// Exception flags and stack-fault bit of the x87 status word.
const SW_EXCEPTION_CAUSE: u32 = 0x7f;
/// Error-summary and busy bits of the x87 status word.
const SW_SUMMARY: u32 = 0x8080;

const FCR_CW: u64 = 0x1f3f;
const MXCSR_CONTROL: u32 = 0xff80;
const MXCSR_STATUS: u32 = 0x3f;
/// x87 status, tag and SSE status bits of `fsr`.
const FSR_LEGACY: u64 = 0x3f_ffff_ffff;
/// Offset and selector bits of `fir`/`fdr`.
const FPTR_LEGACY: u64 = 0xffff_ffff_ffff;

const NATIVE_EXP_BIAS: u32 = 0xffff;
const NATIVE_EXP_MAX: u32 = 0x1_ffff;
const EXT80_EXP_BIAS: u32 = 0x3fff;
const EXT80_EXP_MAX: u32 = 0x7fff;

/// Native floating-point register in spill format.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FpReg {
    pub significand: u64,
    /// 17-bit exponent, sign at bit 17.
    pub sign_exp: u32,
}

impl FpReg {
    /// Converts to the 80-bit extended format.
    ///
    /// Zero/denormal and infinity/NaN exponents map to their extended
    /// encodings; finite exponents outside the extended range saturate.
    pub fn to_ext80(self) -> FpReg32 {
        let sign = (self.sign_exp >> 17) & 1;
        let exp = match self.sign_exp & NATIVE_EXP_MAX {
            0 => 0,
            NATIVE_EXP_MAX => EXT80_EXP_MAX,
            e => (e as i64 - NATIVE_EXP_BIAS as i64 + EXT80_EXP_BIAS as i64)
                .clamp(0, EXT80_EXP_MAX as i64 - 1) as u32,
        };
        let s = self.significand;
        FpReg32 {
            significand: [s as u16, (s >> 16) as u16, (s >> 32) as u16, (s >> 48) as u16],
            exponent: (sign << 15 | exp) as u16,
        }
    }

    /// Converts from the 80-bit extended format.
    pub fn from_ext80(reg: FpReg32) -> Self {
        let sign = (reg.exponent as u32 >> 15) & 1;
        let exp = match reg.exponent as u32 & EXT80_EXP_MAX {
            0 => 0,
            EXT80_EXP_MAX => NATIVE_EXP_MAX,
            e => e + NATIVE_EXP_BIAS - EXT80_EXP_BIAS,
        };
        let significand = reg
            .significand
            .iter()
            .rev()
            .fold(0u64, |acc, &w| acc << 16 | w as u64);
        Self {
            significand,
            sign_exp: sign << 17 | exp,
        }
    }
}

/// IA-32 `struct _fpreg`: an 80-bit x87 register.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FpReg32 {
    pub significand: [u16; 4],
    pub exponent: u16,
}

/// IA-32 `struct _fpxreg`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FpxReg32 {
    pub significand: [u16; 4],
    pub exponent: u16,
    pub padding: [u16; 3],
}

/// IA-32 `struct _xmmreg`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct XmmReg32 {
    pub element: [u32; 4],
}

impl XmmReg32 {
    fn from_halves(lo: u64, hi: u64) -> Self {
        Self {
            element: [lo as u32, (lo >> 32) as u32, hi as u32, (hi >> 32) as u32],
        }
    }

    fn halves(&self) -> (u64, u64) {
        let e = self.element.map(u64::from);
        (e[0] | e[1] << 32, e[2] | e[3] << 32)
    }
}

/// IA-32 `struct _fpstate` (624 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FpState32 {
    pub cw: u32,
    pub sw: u32,
    pub tag: u32,
    pub ipoff: u32,
    pub cssel: u32,
    pub dataoff: u32,
    pub datasel: u32,
    pub st: [FpReg32; 8],
    pub status: u16,
    /// 0 marks an FXSR-format image.
    pub magic: u16,
    pub fxsr_env: [u32; 6],
    pub mxcsr: u32,
    pub reserved: u32,
    pub fxsr_st: [FpxReg32; 8],
    pub xmm: [XmmReg32; 8],
    pub padding: [u32; 56],
}

/// Storage slot of physical register `i` when the x87 stack top is `top`.
pub const fn st_slot(i: usize, top: u32) -> usize {
    (i + (8 - top as usize % 8) % 8) % 8
}

const fn fp_top(fsr: u64) -> u32 {
    ((fsr >> 11) & 7) as u32
}

/// Encodes the live floating-point state into an IA-32 image.
///
/// Clears the pending exception state in `arch.fsr`, so the handler does not
/// trap again on stale flags.
pub fn save_fpstate(regs: &TrapFrame, arch: &mut ArchRegs) -> FpState32 {
    let ArchRegs {
        fsr, fcr, fir, fdr, ..
    } = *arch;
    arch.fsr = fsr & !FSR_EXCEPTION_STATE;

    let mut save = FpState32::zeroed();
    save.cw = (fcr & 0xffff) as u32;
    save.sw = (fsr & 0xffff) as u32;
    save.tag = ((fsr >> 16) & 0xffff) as u32;
    save.ipoff = fir as u32;
    save.cssel = ((fir >> 32) & 0xffff) as u32;
    save.dataoff = fdr as u32;
    save.datasel = ((fdr >> 32) & 0xffff) as u32;
    save.status = fsr as u16;
    save.mxcsr = ((fcr >> 32) as u32 & MXCSR_CONTROL) | ((fsr >> 32) as u32 & MXCSR_STATUS);
    save.magic = 0;

    let top = fp_top(fsr);
    let phys = regs.f8_f11.iter().chain(arch.f12_f15.iter());
    for (i, reg) in phys.enumerate() {
        save.st[st_slot(i, top)] = reg.to_ext80();
    }
    for (xmm, pair) in save.xmm.iter_mut().zip(arch.f16_f31.chunks_exact(2)) {
        *xmm = XmmReg32::from_halves(pair[0], pair[1]);
    }
    save
}

/// Decodes an IA-32 image into the native floating-point state.
///
/// Control and status registers are merged: bits outside the IA-32 windows
/// keep their live value.
pub fn restore_fpstate(save: &FpState32, regs: &mut TrapFrame, arch: &mut ArchRegs) {
    let mxcsr = save.mxcsr;

    arch.fcr = (arch.fcr & !((MXCSR_CONTROL as u64) << 32 | FCR_CW))
        | ((mxcsr & MXCSR_CONTROL) as u64) << 32
        | (save.cw as u64 & FCR_CW);

    let mut sw = save.sw;
    if sw & SW_EXCEPTION_CAUSE == 0 {
        sw &= !SW_SUMMARY;
    }
    arch.fsr = (arch.fsr & !FSR_LEGACY)
        | ((mxcsr & MXCSR_STATUS) as u64) << 32
        | ((save.tag & 0xffff) as u64) << 16
        | (sw & 0xffff) as u64;

    arch.fir = (arch.fir & !FPTR_LEGACY) | ((save.cssel & 0xffff) as u64) << 32 | save.ipoff as u64;
    arch.fdr =
        (arch.fdr & !FPTR_LEGACY) | ((save.datasel & 0xffff) as u64) << 32 | save.dataoff as u64;

    let top = fp_top(arch.fsr);
    for i in 0..8 {
        let reg = FpReg::from_ext80(save.st[st_slot(i, top)]);
        match i {
            0..4 => regs.f8_f11[i] = reg,
            _ => arch.f12_f15[i - 4] = reg,
        }
    }
    for (pair, xmm) in arch.f16_f31.chunks_exact_mut(2).zip(save.xmm.iter()) {
        (pair[0], pair[1]) = xmm.halves();
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Native register file and its IA-32 `sigcontext` view.
use bytemuck::{Pod, Zeroable};

use crate::FpReg;

/// Arithmetic and status flags an IA-32 handler may change on return:
/// CF, PF, AF, ZF, SF, TF, DF, OF and AC.
pub const FIX_EFLAGS: u32 = 0x0004_0dd5;

/// Native trap frame of a task executing IA-32 code.
///
/// The IA-32 general registers live zero-extended in `r8`-`r15`; the six
/// segment selectors are packed into `r16` and `r17` (see
/// [`SegmentSelectors`]).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrapFrame {
    /// Original syscall number. `-1` disables syscall restart checks.
    pub r1: u64,
    /// `eax`
    pub r8: u64,
    /// `ecx`
    pub r9: u64,
    /// `edx`
    pub r10: u64,
    /// `ebx`
    pub r11: u64,
    /// `esp`
    pub r12: u64,
    /// `ebp`
    pub r13: u64,
    /// `esi`
    pub r14: u64,
    /// `edi`
    pub r15: u64,
    /// `ds`, `es`, `fs`, `gs` at bits 0, 16, 32, 48.
    pub r16: u64,
    /// `cs`, `ss` at bits 0, 16.
    pub r17: u64,
    /// `eip`
    pub cr_iip: u64,
    /// f8-f11, spilled on trap entry.
    pub f8_f11: [FpReg; 4],
}

/// Native registers that are not saved on trap entry and are read live.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchRegs {
    /// IA-32 `eflags`.
    pub eflag: u64,
    /// x87 status and tag words, SSE status flags at bits 32..37.
    pub fsr: u64,
    /// x87 control word, SSE control bits at 39..47.
    pub fcr: u64,
    /// Last x87 instruction pointer and code selector.
    pub fir: u64,
    /// Last x87 data pointer and data selector.
    pub fdr: u64,
    pub f12_f15: [FpReg; 4],
    /// The eight XMM registers as pairs of 64-bit halves, low half first.
    pub f16_f31: [u64; 16],
}

/// The six IA-32 segment selectors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSelectors {
    pub ds: u16,
    pub es: u16,
    pub fs: u16,
    pub gs: u16,
    pub cs: u16,
    pub ss: u16,
}

impl SegmentSelectors {
    /// Splits the packed native fields.
    pub const fn unpack(r16: u64, r17: u64) -> Self {
        Self {
            ds: r16 as u16,
            es: (r16 >> 16) as u16,
            fs: (r16 >> 32) as u16,
            gs: (r16 >> 48) as u16,
            cs: r17 as u16,
            ss: (r17 >> 16) as u16,
        }
    }

    /// Builds the native data segment field from scratch.
    pub const fn pack_data(&self) -> u64 {
        self.ds as u64 | (self.es as u64) << 16 | (self.fs as u64) << 32 | (self.gs as u64) << 48
    }

    /// Builds the native code/stack segment field from scratch.
    pub const fn pack_code(&self) -> u64 {
        self.cs as u64 | (self.ss as u64) << 16
    }

    /// Forces user privilege on the code and stack selectors.
    pub const fn strict(self) -> Self {
        Self {
            cs: self.cs | 3,
            ss: self.ss | 3,
            ..self
        }
    }
}

/// IA-32 `struct sigcontext`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SigContext32 {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub trapno: u32,
    pub err: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp_at_signal: u32,
    pub ss: u32,
    /// User address of the extended state, 0 if none.
    pub fpstate: u32,
    pub oldmask: u32,
    pub cr2: u32,
}

impl SigContext32 {
    /// Captures the integer register state of `regs`.
    ///
    /// `fpstate` and `oldmask` are left zero for the frame builder.
    pub fn capture(regs: &TrapFrame, eflag: u64) -> Self {
        let seg = SegmentSelectors::unpack(regs.r16, regs.r17);
        Self {
            gs: seg.gs as u32,
            fs: seg.fs as u32,
            es: seg.es as u32,
            ds: seg.ds as u32,
            edi: regs.r15 as u32,
            esi: regs.r14 as u32,
            ebp: regs.r13 as u32,
            esp: regs.r12 as u32,
            ebx: regs.r11 as u32,
            edx: regs.r10 as u32,
            ecx: regs.r9 as u32,
            eax: regs.r8 as u32,
            eip: regs.cr_iip as u32,
            cs: seg.cs as u32,
            eflags: eflag as u32,
            esp_at_signal: regs.r12 as u32,
            ss: seg.ss as u32,
            ..Self::zeroed()
        }
    }

    /// Returns the saved selectors, `cs`/`ss` forced to user privilege.
    ///
    /// Only the low 16 bits of each slot are meaningful.
    pub const fn selectors(&self) -> SegmentSelectors {
        SegmentSelectors {
            ds: self.ds as u16,
            es: self.es as u16,
            fs: self.fs as u16,
            gs: self.gs as u16,
            cs: self.cs as u16,
            ss: self.ss as u16,
        }
        .strict()
    }

    /// Writes the saved integer registers back into `regs`.
    ///
    /// `eax` is not written here: it becomes the return value of the
    /// `sigreturn` call.
    pub fn restore_regs(&self, regs: &mut TrapFrame) {
        let seg = self.selectors();
        regs.r16 = seg.pack_data();
        regs.r17 = seg.pack_code();
        regs.r15 = self.edi as u64;
        regs.r14 = self.esi as u64;
        regs.r13 = self.ebp as u64;
        regs.r12 = self.esp as u64;
        regs.r11 = self.ebx as u64;
        regs.r10 = self.edx as u64;
        regs.r9 = self.ecx as u64;
        regs.cr_iip = self.eip as u64;
    }
}

/// Merges user-supplied `eflags` into the live flags register.
///
/// Only [`FIX_EFLAGS`] bits are taken from `user`.
pub const fn merge_eflags(live: u64, user: u32) -> u64 {
    (live & !(FIX_EFLAGS as u64)) | (user & FIX_EFLAGS) as u64
}

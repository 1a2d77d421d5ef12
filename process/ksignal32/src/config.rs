// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Compile-time parameters of the IA-32 compat environment.

/// Base of the IA-32 gate page mapped into every compat task.
pub const GATE_PAGE_ADDR: u32 = 0xc000_0000;

/// Restorer stub for plain frames inside the gate page.
pub const GATE_SIGRETURN: u32 = GATE_PAGE_ADDR;

/// Restorer stub for real-time frames inside the gate page.
pub const GATE_RT_SIGRETURN: u32 = GATE_PAGE_ADDR + 8;

/// Number of signals in the IA-32 ABI.
pub const COMPAT_NSIG: usize = 64;

/// Number of 32-bit words in an IA-32 `sigset_t`.
pub const COMPAT_NSIG_WORDS: usize = COMPAT_NSIG / 32;

/// Smallest alternate signal stack accepted from an IA-32 task.
pub const COMPAT_MINSIGSTKSZ: u32 = 2048;

/// End of the IA-32 user address space.
pub const COMPAT_USER_LIMIT: u64 = 1 << 32;

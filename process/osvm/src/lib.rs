// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Helpers for reading/writing user virtual memory.
//!
//! Every access goes through a [`VirtMemIo`] implementation supplied by the
//! caller, so the same code runs against a live address space or against a
//! staged buffer.
#![cfg_attr(not(test), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

use bytemuck::{AnyBitPattern, NoUninit};

/// Errors returned by virtual memory access helpers.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MemError {
    /// The address range wraps or lies outside the user address space.
    InvalidAddr,
    /// The range is not mapped with the requested access.
    NoAccess,
}

/// Result type for virtual memory operations.
pub type MemResult<T = ()> = Result<T, MemError>;

/// Kind of access checked by [`VirtMemIo::access_ok`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Access {
    Read,
    Write,
}

/// Platform-specific memory I/O for one user address space.
///
/// Implementations must tolerate faults: an inaccessible range yields an
/// error, never a partial copy.
pub trait VirtMemIo {
    /// Returns whether the whole range `[addr, addr + len)` may be accessed.
    fn access_ok(&self, addr: usize, len: usize, access: Access) -> bool;

    /// Copies `out.len()` bytes starting at `addr` into `out`.
    fn read_mem(&self, addr: usize, out: &mut [u8]) -> MemResult;

    /// Copies `src` to user memory starting at `addr`.
    fn write_mem(&mut self, addr: usize, src: &[u8]) -> MemResult;
}

/// Read a plain-old-data value from virtual memory.
pub fn read_vm_mem<T: AnyBitPattern + NoUninit, M: VirtMemIo + ?Sized>(mem: &M, addr: usize) -> MemResult<T> {
    let mut val = T::zeroed();
    mem.read_mem(addr, bytemuck::bytes_of_mut(&mut val))?;
    Ok(val)
}

/// Write a plain-old-data value to virtual memory.
pub fn write_vm_mem<T: NoUninit, M: VirtMemIo + ?Sized>(
    mem: &mut M,
    addr: usize,
    val: &T,
) -> MemResult {
    mem.write_mem(addr, bytemuck::bytes_of(val))
}

mod ptrs;
pub use ptrs::UserPtr;

#[cfg(feature = "alloc")]
mod region;
#[cfg(feature = "alloc")]
pub use region::RegionMem;

mod tests;

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Typed user pointer for safe user memory access.
use core::{fmt, marker::PhantomData};

use bytemuck::{AnyBitPattern, NoUninit};

use crate::{Access, MemResult, VirtMemIo, read_vm_mem, write_vm_mem};

/// A user-space address known to hold a `T`.
///
/// The pointer is never dereferenced directly; all accesses go through a
/// [`VirtMemIo`].
pub struct UserPtr<T> {
    addr: usize,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Clone for UserPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for UserPtr<T> {}

impl<T> PartialEq for UserPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for UserPtr<T> {}

impl<T> fmt::Debug for UserPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserPtr({:#x})", self.addr)
    }
}

impl<T> From<usize> for UserPtr<T> {
    fn from(addr: usize) -> Self {
        Self::new(addr)
    }
}

impl<T> UserPtr<T> {
    /// Wraps a raw user address.
    pub const fn new(addr: usize) -> Self {
        Self {
            addr,
            _ty: PhantomData,
        }
    }

    /// Returns the raw address.
    pub const fn addr(self) -> usize {
        self.addr
    }

    /// Returns whether the address is zero.
    pub const fn is_null(self) -> bool {
        self.addr == 0
    }

    /// Returns `None` if the pointer is null.
    pub fn check_non_null(self) -> Option<Self> {
        if self.is_null() { None } else { Some(self) }
    }

    /// Reinterprets the pointee type.
    pub const fn cast<U>(self) -> UserPtr<U> {
        UserPtr::new(self.addr)
    }

    /// Checks that the whole pointee is accessible.
    pub fn access_ok<M: VirtMemIo + ?Sized>(self, mem: &M, access: Access) -> bool {
        mem.access_ok(self.addr, size_of::<T>(), access)
    }
}

impl<T: AnyBitPattern + NoUninit> UserPtr<T> {
    /// Read a typed value from user memory.
    pub fn read_vm<M: VirtMemIo + ?Sized>(self, mem: &M) -> MemResult<T> {
        read_vm_mem(mem, self.addr)
    }
}

impl<T: NoUninit> UserPtr<T> {
    /// Write a typed value to user memory.
    pub fn write_vm<M: VirtMemIo + ?Sized>(self, mem: &mut M, val: &T) -> MemResult {
        write_vm_mem(mem, self.addr, val)
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Heap-backed sparse address space.
use alloc::{vec, vec::Vec};

use crate::{Access, MemError, MemResult, VirtMemIo};

struct Region {
    base: usize,
    data: Vec<u8>,
    writable: bool,
}

impl Region {
    fn end(&self) -> usize {
        self.base + self.data.len()
    }

    fn contains(&self, addr: usize, len: usize) -> bool {
        addr >= self.base && addr.checked_add(len).is_some_and(|end| end <= self.end())
    }
}

/// A user address space made of disjoint zero-filled regions.
///
/// An access must fall entirely inside one region; anything else faults.
#[derive(Default)]
pub struct RegionMem {
    regions: Vec<Region>,
}

impl RegionMem {
    /// Creates an empty address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `len` zeroed bytes at `base`.
    ///
    /// Returns [`MemError::InvalidAddr`] if the range wraps or overlaps an
    /// existing region.
    pub fn map(&mut self, base: usize, len: usize, writable: bool) -> MemResult {
        let end = base.checked_add(len).ok_or(MemError::InvalidAddr)?;
        if self.regions.iter().any(|r| base < r.end() && r.base < end) {
            return Err(MemError::InvalidAddr);
        }
        self.regions.push(Region {
            base,
            data: vec![0; len],
            writable,
        });
        Ok(())
    }

    /// Removes the region starting at `base`.
    pub fn unmap(&mut self, base: usize) -> MemResult {
        let idx = self
            .regions
            .iter()
            .position(|r| r.base == base)
            .ok_or(MemError::InvalidAddr)?;
        self.regions.swap_remove(idx);
        Ok(())
    }

    /// Borrows `len` bytes at `addr` without access checks on permissions.
    pub fn bytes(&self, addr: usize, len: usize) -> Option<&[u8]> {
        let region = self.find(addr, len)?;
        let off = addr - region.base;
        Some(&region.data[off..off + len])
    }

    fn find(&self, addr: usize, len: usize) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(addr, len))
    }

    fn find_mut(&mut self, addr: usize, len: usize) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.contains(addr, len))
    }
}

impl VirtMemIo for RegionMem {
    fn access_ok(&self, addr: usize, len: usize, access: Access) -> bool {
        match self.find(addr, len) {
            Some(region) => access == Access::Read || region.writable,
            None => false,
        }
    }

    fn read_mem(&self, addr: usize, out: &mut [u8]) -> MemResult {
        let region = self.find(addr, out.len()).ok_or(MemError::NoAccess)?;
        let off = addr - region.base;
        out.copy_from_slice(&region.data[off..off + out.len()]);
        Ok(())
    }

    fn write_mem(&mut self, addr: usize, src: &[u8]) -> MemResult {
        let region = self.find_mut(addr, src.len()).ok_or(MemError::NoAccess)?;
        if !region.writable {
            return Err(MemError::NoAccess);
        }
        let off = addr - region.base;
        region.data[off..off + src.len()].copy_from_slice(src);
        Ok(())
    }
}

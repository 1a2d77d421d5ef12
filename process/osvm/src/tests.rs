//! Unit tests for osvm

#![cfg(test)]

use bytemuck::{Pod, Zeroable};

use crate::{Access, MemError, RegionMem, UserPtr, VirtMemIo, read_vm_mem, write_vm_mem};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
struct Pair {
    lo: u32,
    hi: u32,
}

#[test]
fn test_read_write_vm_mem() {
    let mut mem = RegionMem::new();
    mem.map(0x1000, 0x100, true).unwrap();

    write_vm_mem(&mut mem, 0x1010, &0x1234_5678_90AB_CDEFu64).unwrap();
    let val: u64 = read_vm_mem(&mem, 0x1010).unwrap();
    assert_eq!(val, 0x1234_5678_90AB_CDEF);

    // Little-endian byte view
    assert_eq!(mem.bytes(0x1010, 2).unwrap(), &[0xEF, 0xCD]);
}

#[test]
fn test_user_ptr_helpers() {
    let mut mem = RegionMem::new();
    mem.map(0x2000, 0x40, true).unwrap();

    let ptr: UserPtr<Pair> = UserPtr::new(0x2008);
    assert_eq!(ptr.addr(), 0x2008);
    assert!(ptr.check_non_null().is_some());
    assert!(UserPtr::<Pair>::new(0).check_non_null().is_none());

    ptr.write_vm(&mut mem, &Pair { lo: 1, hi: 2 }).unwrap();
    assert_eq!(ptr.read_vm(&mem).unwrap(), Pair { lo: 1, hi: 2 });
    assert_eq!(ptr.cast::<u32>().read_vm(&mem).unwrap(), 1);
}

#[test]
fn test_access_crossing_region_end() {
    let mut mem = RegionMem::new();
    mem.map(0x3000, 0x10, true).unwrap();

    assert!(mem.access_ok(0x3000, 0x10, Access::Write));
    assert!(!mem.access_ok(0x3008, 0x10, Access::Read));
    assert_eq!(
        read_vm_mem::<u64, _>(&mem, 0x300c),
        Err(MemError::NoAccess)
    );
    assert!(!mem.access_ok(usize::MAX - 1, 4, Access::Read));
}

#[test]
fn test_read_only_region() {
    let mut mem = RegionMem::new();
    mem.map(0x4000, 0x10, false).unwrap();

    assert!(mem.access_ok(0x4000, 4, Access::Read));
    assert!(!mem.access_ok(0x4000, 4, Access::Write));
    assert_eq!(
        write_vm_mem(&mut mem, 0x4000, &7u32),
        Err(MemError::NoAccess)
    );
    assert_eq!(mem.bytes(0x4000, 4).unwrap(), &[0; 4]);
}

#[test]
fn test_map_rejects_overlap() {
    let mut mem = RegionMem::new();
    mem.map(0x5000, 0x100, true).unwrap();
    assert_eq!(mem.map(0x50f0, 0x20, true), Err(MemError::InvalidAddr));
    mem.unmap(0x5000).unwrap();
    assert!(mem.map(0x50f0, 0x20, true).is_ok());
}

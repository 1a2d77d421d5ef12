//! Test helpers: a recording signal host and a sparse IA-32 address space

#![allow(unused)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
};

use bytemuck::{AnyBitPattern, NoUninit};
use ksignal32::{
    ArchRegs, CompatTask, FpReg, SigError, SigResult, SignalAction, SignalHost, SignalInfo,
    SignalSet, TrapFrame, config::COMPAT_NSIG,
};
use linux_raw_sys::general::{SIGKILL, SIGSTOP};
use osvm::{Access, MemError, MemResult, RegionMem, UserPtr, VirtMemIo};

/// Main stack of the test task.
pub const STACK_BASE: usize = 0x0800_0000;
pub const STACK_SIZE: usize = 0x4000;
pub const STACK_TOP: usize = STACK_BASE + STACK_SIZE;

/// Scratch area for syscall arguments.
pub const SCRATCH: usize = 0x0900_0000;
pub const SCRATCH_SIZE: usize = 0x1000;

/// Region reserved for alternate signal stacks.
pub const ALT_BASE: usize = 0x0a00_0000;
pub const ALT_SIZE: usize = 0x2000;

pub const HANDLER: u32 = 0x0804_9000;
pub const RESTORER: u32 = 0x0804_a000;

pub type TestTask = CompatTask<RegionMem, MockHost>;

/// Host that records every request made by the signal code.
#[derive(Default)]
pub struct MockHost {
    pub forced: RefCell<Vec<u32>>,
    pub actions: RefCell<HashMap<u32, SignalAction>>,
    pub queued: RefCell<Vec<(i32, u32, SignalInfo)>>,
    pub recalcs: Cell<usize>,
    pub reschedules: Cell<usize>,
    pub segment_reloads: Cell<usize>,
}

impl MockHost {
    pub fn action(&self, sig: u32) -> SignalAction {
        self.actions.borrow().get(&sig).copied().unwrap_or_default()
    }

    pub fn forced(&self) -> Vec<u32> {
        self.forced.borrow().clone()
    }
}

impl SignalHost for MockHost {
    fn recalc_sigpending(&self, _blocked: SignalSet) {
        self.recalcs.set(self.recalcs.get() + 1);
    }

    fn force_sig(&self, sig: u32) {
        self.forced.borrow_mut().push(sig);
    }

    fn schedule_interruptible(&self) {
        self.reschedules.set(self.reschedules.get() + 1);
    }

    fn do_sigaction(&self, sig: u32, act: Option<&SignalAction>) -> SigResult<SignalAction> {
        if !(1..=COMPAT_NSIG as u32).contains(&sig) {
            return Err(SigError::InvalidInput);
        }
        if act.is_some() && (sig == SIGKILL || sig == SIGSTOP) {
            return Err(SigError::InvalidInput);
        }
        let old = self.action(sig);
        if let Some(act) = act {
            self.actions.borrow_mut().insert(sig, *act);
        }
        Ok(old)
    }

    fn sigqueueinfo(&self, pid: i32, sig: u32, info: &SignalInfo) -> SigResult<isize> {
        self.queued.borrow_mut().push((pid, sig, *info));
        Ok(0)
    }

    fn load_segment_descriptors(&self, _regs: &TrapFrame) {
        self.segment_reloads.set(self.segment_reloads.get() + 1);
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A task with a writable main stack, scratch page and alternate stack area.
pub fn setup_task() -> TestTask {
    init_logger();
    let mut mem = RegionMem::new();
    mem.map(STACK_BASE, STACK_SIZE, true).unwrap();
    mem.map(SCRATCH, SCRATCH_SIZE, true).unwrap();
    mem.map(ALT_BASE, ALT_SIZE, true).unwrap();
    let mut task = CompatTask::new(mem, MockHost::default());
    task.arch = sample_arch();
    task
}

pub fn fp_marker(i: usize) -> FpReg {
    FpReg {
        significand: 0xc000_0000_0000_0000 | (i as u64) << 12,
        sign_exp: 0xffff + i as u32,
    }
}

/// Registers of a task interrupted in user mode.
pub fn sample_regs() -> TrapFrame {
    TrapFrame {
        r1: 4,
        r8: 0x1111_1111,
        r9: 0x2222_2222,
        r10: 0x3333_3333,
        r11: 0x4444_4444,
        r12: (STACK_TOP - 0x103) as u64,
        r13: 0x5555_5555,
        r14: 0x6666_6666,
        r15: 0x7777_7777,
        // ds/es 0x2b, fs 0x33, gs 0x63
        r16: 0x0063_0033_002b_002b,
        // cs 0x23, ss 0x2b
        r17: 0x002b_0023,
        cr_iip: 0x0804_8123,
        f8_f11: [fp_marker(0), fp_marker(1), fp_marker(2), fp_marker(3)],
    }
}

pub fn sample_arch() -> ArchRegs {
    let mut f16_f31 = [0; 16];
    for (k, half) in f16_f31.iter_mut().enumerate() {
        *half = 0x0f0f_0000_0000_0000 | k as u64;
    }
    ArchRegs {
        eflag: 0x0000_0000_0000_0246,
        fcr: 0x0000_1f80_0000_033f,
        fsr: 0x0000_0000_ffff_3000,
        fir: 0x0000_0023_0804_8100,
        fdr: 0x0000_002b_0800_2000,
        f12_f15: [fp_marker(4), fp_marker(5), fp_marker(6), fp_marker(7)],
        f16_f31,
    }
}

pub fn handler_action(flags: ksignal32::SaFlags) -> SignalAction {
    let mut action = SignalAction {
        flags,
        ..Default::default()
    };
    action.set_compat_handler(HANDLER, RESTORER);
    action
}

pub fn read_user<T: AnyBitPattern + NoUninit>(task: &TestTask, addr: u32) -> T {
    UserPtr::<T>::new(addr as usize).read_vm(&task.mem).unwrap()
}

pub fn write_user<T: NoUninit>(task: &mut TestTask, addr: u32, val: &T) {
    UserPtr::<T>::new(addr as usize)
        .write_vm(&mut task.mem, val)
        .unwrap();
}

pub fn set_of(sigs: &[u32]) -> SignalSet {
    let mut set = SignalSet::empty();
    for &sig in sigs {
        set.add(sig);
    }
    set
}

/// Address space whose access checks and stores can be made to lie.
///
/// With `open` set every range passes `access_ok` and unmapped reads yield
/// zeros. With `fail_writes` set every store faults after the check.
#[derive(Default)]
pub struct FaultyMem {
    pub inner: RegionMem,
    pub open: bool,
    pub fail_writes: bool,
}

impl VirtMemIo for FaultyMem {
    fn access_ok(&self, addr: usize, len: usize, access: Access) -> bool {
        self.open || self.inner.access_ok(addr, len, access)
    }

    fn read_mem(&self, addr: usize, out: &mut [u8]) -> MemResult {
        match self.inner.read_mem(addr, out) {
            Err(_) if self.open => {
                out.fill(0);
                Ok(())
            }
            res => res,
        }
    }

    fn write_mem(&mut self, addr: usize, src: &[u8]) -> MemResult {
        if self.fail_writes {
            return Err(MemError::NoAccess);
        }
        self.inner.write_mem(addr, src)
    }
}

/// Same layout as [`setup_task`] over a [`FaultyMem`].
pub fn setup_faulty_task() -> CompatTask<FaultyMem, MockHost> {
    let task = setup_task();
    let mut faulty = CompatTask::new(
        FaultyMem {
            inner: task.mem,
            ..Default::default()
        },
        MockHost::default(),
    );
    faulty.arch = sample_arch();
    faulty
}

//! Signal return tests

mod test_helpers;

use std::mem::offset_of;

use ksignal32::{
    FIX_EFLAGS, RestartBlock, RtSigFrame32, SaFlags, SigContext32, SigFrame32, SignalInfo,
    SignalSet, SignalStack, StackT32, TrapFrame, UContext32,
    api::{Sysno32, handle_compat_syscall},
};
use linux_raw_sys::general::{SIGINT, SIGKILL, SIGSEGV, SIGSTOP, SIGUSR1, SIGUSR2};
use test_helpers::*;

/// What a handler may do to the live state before it returns.
fn clobber(task: &mut TestTask, regs: &mut TrapFrame) {
    regs.r8 = 0xdead;
    regs.r9 = 0xdead;
    regs.r10 = 0xdead;
    regs.r11 = 0xdead;
    regs.r13 = 0xdead;
    regs.r14 = 0xdead;
    regs.r15 = 0xdead;
    regs.r16 = 0;
    regs.r17 = 0;
    regs.cr_iip = (HANDLER + 0x40) as u64;
    regs.f8_f11 = Default::default();
    task.arch.eflag = 0x202 | FIX_EFLAGS as u64;
    task.arch.fsr = 0;
    task.arch.fcr = 0;
    task.arch.fir = 0;
    task.arch.fdr = 0;
    task.arch.f12_f15 = Default::default();
    task.arch.f16_f31 = [0; 16];
}

fn sigreturn(task: &mut TestTask, regs: &mut TrapFrame) -> Option<isize> {
    handle_compat_syscall(task, regs, Sysno32::sigreturn as u32, [0; 6])
}

fn rt_sigreturn(task: &mut TestTask, regs: &mut TrapFrame) -> Option<isize> {
    handle_compat_syscall(task, regs, Sysno32::rt_sigreturn as u32, [0; 6])
}

fn assert_resumed(regs: &TrapFrame, orig: &TrapFrame) {
    assert_eq!(
        TrapFrame {
            r1: orig.r1,
            ..regs.clone()
        },
        *orig
    );
    assert_eq!(regs.r1, u64::MAX);
}

/// Delivers a plain frame and unwinds to where `sigreturn` finds it.
fn deliver_plain(task: &mut TestTask, set: SignalSet) -> (TrapFrame, u32) {
    let mut regs = sample_regs();
    let addr = task
        .setup_frame(SIGUSR1, &handler_action(SaFlags::empty()), set, &mut regs)
        .unwrap();
    // `ret` popped pretcode, the trampoline popped the signal number.
    regs.r12 = addr as u64 + 8;
    (regs, addr)
}

// ========== Round Trips ==========

#[test]
fn test_plain_round_trip() {
    let mut task = setup_task();
    let arch = task.arch.clone();
    let set = set_of(&[SIGINT, 40]);
    let (mut regs, _) = deliver_plain(&mut task, set);
    clobber(&mut task, &mut regs);

    let ret = sigreturn(&mut task, &mut regs);
    assert_eq!(ret, Some(0x1111_1111));

    assert_resumed(&regs, &sample_regs());
    assert_eq!(task.arch, arch);
    assert_eq!(task.blocked(), set);
    assert_eq!(task.restart_block, RestartBlock::NoRestart);
    assert_eq!(task.host.segment_reloads.get(), 1);
    assert!(task.host.forced().is_empty());
}

#[test]
fn test_rt_round_trip() {
    let mut task = setup_task();
    let arch = task.arch.clone();
    let mut regs = sample_regs();
    let set = set_of(&[SIGUSR2, 33]);
    let info = SignalInfo::new_user(SIGUSR1, 77, 1000);
    let addr = task
        .setup_frame1(SIGUSR1, &handler_action(SaFlags::SIGINFO), &info, set, &mut regs)
        .unwrap();
    regs.r12 = addr as u64 + 4;
    clobber(&mut task, &mut regs);

    assert_eq!(rt_sigreturn(&mut task, &mut regs), Some(0x1111_1111));
    assert_eq!(regs.r8, 0x1111_1111);
    assert_resumed(&regs, &sample_regs());
    assert_eq!(task.arch, arch);
    assert_eq!(task.blocked(), set);
    assert_eq!(task.sas, SignalStack::default());
}

#[test]
fn test_negative_eax_is_sign_extended() {
    let mut task = setup_task();
    let mut regs = TrapFrame {
        r8: (-4i32) as u32 as u64,
        ..sample_regs()
    };
    let addr = task
        .setup_frame(SIGUSR1, &handler_action(SaFlags::empty()), Default::default(), &mut regs)
        .unwrap();
    regs.r12 = addr as u64 + 8;
    assert_eq!(sigreturn(&mut task, &mut regs), Some(-4));
    assert_eq!(regs.r8, 0xffff_fffc);
}

// ========== Frame Sanitization ==========

#[test]
fn test_kill_and_stop_never_restored() {
    let mut task = setup_task();
    let mut regs = sample_regs();
    let set = set_of(&[SIGKILL, SIGSTOP, SIGUSR2]);
    let info = SignalInfo::new_kernel(SIGUSR1);
    let addr = task
        .setup_frame1(SIGUSR1, &handler_action(SaFlags::SIGINFO), &info, set, &mut regs)
        .unwrap();
    regs.r12 = addr as u64 + 4;

    rt_sigreturn(&mut task, &mut regs);
    let blocked = task.blocked();
    assert!(!blocked.has(SIGKILL));
    assert!(!blocked.has(SIGSTOP));
    assert!(blocked.has(SIGUSR2));
}

#[test]
fn test_forged_plain_mask_sanitized() {
    let mut task = setup_task();
    let (mut regs, addr) = deliver_plain(&mut task, SignalSet::empty());
    let sc = addr + offset_of!(SigFrame32, sc) as u32;
    write_user(&mut task, sc + offset_of!(SigContext32, oldmask) as u32, &u32::MAX);
    write_user(
        &mut task,
        addr + offset_of!(SigFrame32, extramask) as u32,
        &[u32::MAX],
    );

    sigreturn(&mut task, &mut regs);
    assert_eq!(
        task.blocked(),
        SignalSet::from_bits(u64::MAX).blockable()
    );
}

#[test]
fn test_forged_selectors_forced_to_user_privilege() {
    let mut task = setup_task();
    let (mut regs, addr) = deliver_plain(&mut task, SignalSet::empty());
    let sc = addr + offset_of!(SigFrame32, sc) as u32;
    write_user(&mut task, sc + offset_of!(SigContext32, cs) as u32, &0x0010u32);
    write_user(&mut task, sc + offset_of!(SigContext32, ss) as u32, &0xffff_0018u32);

    sigreturn(&mut task, &mut regs);
    assert_eq!(regs.r17, 0x001b_0013);
}

#[test]
fn test_only_fixed_eflags_restored() {
    let mut task = setup_task();
    let (mut regs, addr) = deliver_plain(&mut task, SignalSet::empty());
    let sc = addr + offset_of!(SigFrame32, sc) as u32;
    write_user(&mut task, sc + offset_of!(SigContext32, eflags) as u32, &u32::MAX);
    task.arch.eflag = 0xffff_0000_0000_0000;

    sigreturn(&mut task, &mut regs);
    assert_eq!(task.arch.eflag, 0xffff_0000_0000_0000 | FIX_EFLAGS as u64);
}

// ========== Bad Frames ==========

#[test]
fn test_unmapped_frame_forces_sigsegv() {
    let mut task = setup_task();
    let mut regs = TrapFrame {
        r12: 0x100,
        ..sample_regs()
    };
    let blocked = set_of(&[SIGUSR2]);
    task.set_blocked(blocked);

    assert_eq!(sigreturn(&mut task, &mut regs), Some(0));
    assert_eq!(task.host.forced(), [SIGSEGV]);
    assert_eq!(task.blocked(), blocked);
    assert_eq!(
        regs,
        TrapFrame {
            r8: 0,
            r12: 0x100,
            ..sample_regs()
        }
    );

    assert_eq!(rt_sigreturn(&mut task, &mut regs), Some(0));
    assert_eq!(task.host.forced(), [SIGSEGV, SIGSEGV]);
}

#[test]
fn test_frame_crossing_stack_end_is_bad() {
    let mut task = setup_task();
    let mut regs = TrapFrame {
        r12: (STACK_TOP - 0x40) as u64,
        ..sample_regs()
    };
    assert_eq!(rt_sigreturn(&mut task, &mut regs), Some(0));
    assert_eq!(task.host.forced(), [SIGSEGV]);
}

#[test]
fn test_bad_fpstate_pointer_leaves_registers() {
    let mut task = setup_task();
    let (mut regs, addr) = deliver_plain(&mut task, SignalSet::empty());
    let sc = addr + offset_of!(SigFrame32, sc) as u32;
    write_user(&mut task, sc + offset_of!(SigContext32, fpstate) as u32, &0x10u32);
    clobber(&mut task, &mut regs);
    let clobbered = regs.clone();

    assert_eq!(sigreturn(&mut task, &mut regs), Some(0));
    assert_eq!(task.host.forced(), [SIGSEGV]);
    assert_eq!(
        regs,
        TrapFrame {
            r8: 0,
            ..clobbered
        }
    );
}

#[test]
fn test_null_fpstate_keeps_live_fp_registers() {
    let mut task = setup_task();
    let (mut regs, addr) = deliver_plain(&mut task, SignalSet::empty());
    let sc = addr + offset_of!(SigFrame32, sc) as u32;
    write_user(&mut task, sc + offset_of!(SigContext32, fpstate) as u32, &0u32);
    clobber(&mut task, &mut regs);

    assert_eq!(sigreturn(&mut task, &mut regs), Some(0x1111_1111));
    assert_eq!(regs.r9, sample_regs().r9);
    assert_eq!(regs.f8_f11, TrapFrame::default().f8_f11);
    assert_eq!(task.arch.fcr, 0);
}

// ========== Alternate Stack ==========

#[test]
fn test_rt_sigreturn_reapplies_alternate_stack() {
    let mut task = setup_task();
    let mut regs = sample_regs();
    let info = SignalInfo::new_kernel(SIGUSR1);
    let addr = task
        .setup_frame1(
            SIGUSR1,
            &handler_action(SaFlags::SIGINFO),
            &info,
            Default::default(),
            &mut regs,
        )
        .unwrap();
    let stack = StackT32 {
        ss_sp: ALT_BASE as u32,
        ss_flags: 0,
        ss_size: ALT_SIZE as u32,
    };
    let uc = addr + offset_of!(RtSigFrame32, uc) as u32;
    write_user(&mut task, uc + offset_of!(UContext32, uc_stack) as u32, &stack);
    regs.r12 = addr as u64 + 4;

    assert_eq!(rt_sigreturn(&mut task, &mut regs), Some(0x1111_1111));
    assert_eq!(
        task.sas,
        SignalStack {
            sp: ALT_BASE as u64,
            size: ALT_SIZE as u64,
        }
    );
}

#[test]
fn test_rt_sigreturn_ignores_alternate_stack_errors() {
    let mut task = setup_task();
    let alt = SignalStack {
        sp: ALT_BASE as u64,
        size: ALT_SIZE as u64,
    };
    task.sas = alt;
    let mut regs = sample_regs();
    let info = SignalInfo::new_kernel(SIGUSR1);
    let addr = task
        .setup_frame1(
            SIGUSR1,
            &handler_action(SaFlags::SIGINFO | SaFlags::ONSTACK),
            &info,
            Default::default(),
            &mut regs,
        )
        .unwrap();
    // Too small, and the handler is still running on the stack anyway.
    let stack = StackT32 {
        ss_sp: STACK_BASE as u32,
        ss_flags: 0,
        ss_size: 16,
    };
    let uc = addr + offset_of!(RtSigFrame32, uc) as u32;
    write_user(&mut task, uc + offset_of!(UContext32, uc_stack) as u32, &stack);
    regs.r12 = addr as u64 + 4;

    assert_eq!(rt_sigreturn(&mut task, &mut regs), Some(0x1111_1111));
    assert_eq!(task.sas, alt);
    assert!(task.host.forced().is_empty());
    assert_resumed(&regs, &sample_regs());
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! IA-32 compat signal delivery and return.
//!
//! Lets a 64-bit kernel deliver signals to, and resume, a task running the
//! 32-bit IA-32 ABI. The crate translates the native register snapshot,
//! floating-point state and `siginfo` into the byte-exact IA-32 signal frame
//! on the task's own stack, and parses such a frame back on `sigreturn`.
//!
//! Delivery: [`CompatTask::setup_frame1`] picks [`CompatTask::setup_frame`]
//! or [`CompatTask::setup_rt_frame`].
//! Return: [`sys32_sigreturn`] / [`sys32_rt_sigreturn`].
#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

pub mod api;
pub mod config;

mod error;
pub use error::*;

mod fpstate;
pub use fpstate::*;

mod frame;
pub use frame::*;

mod regs;
pub use regs::*;

mod siginfo;
pub use siginfo::*;

mod sigreturn;
pub use sigreturn::*;

mod task;
pub use task::*;

mod types;
pub use types::*;

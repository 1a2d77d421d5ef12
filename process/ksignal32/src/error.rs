// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Error type of the compat signal syscalls.
use derive_more::Display;
use linux_raw_sys::errno::{EFAULT, EINVAL, ENOMEM, EPERM};
use osvm::MemError;

/// Kernel-internal: restart the syscall only if no handler ran.
const ERESTARTNOHAND: u32 = 514;

/// Errors reported to the immediate caller of a compat syscall.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SigError {
    #[display("bad address")]
    BadAddress,
    #[display("invalid argument")]
    InvalidInput,
    #[display("operation not permitted")]
    PermissionDenied,
    #[display("out of memory")]
    NoMemory,
    #[display("restart if no handler")]
    RestartNoHand,
}

impl SigError {
    /// Returns the positive errno value.
    pub const fn errno(self) -> u32 {
        match self {
            Self::BadAddress => EFAULT,
            Self::InvalidInput => EINVAL,
            Self::PermissionDenied => EPERM,
            Self::NoMemory => ENOMEM,
            Self::RestartNoHand => ERESTARTNOHAND,
        }
    }

    /// Returns the value handed back in the syscall return register.
    pub const fn as_ret(self) -> isize {
        -(self.errno() as isize)
    }
}

impl From<MemError> for SigError {
    fn from(e: MemError) -> Self {
        match e {
            MemError::InvalidAddr | MemError::NoAccess => Self::BadAddress,
        }
    }
}

/// Result type of the compat signal syscalls.
pub type SigResult<T = ()> = Result<T, SigError>;

//! 系统调用产生的错误
//!
//! 每个变体的第一个字段是返回给用户态的错误码（负的 errno）。

use alloc::string::String;
use thiserror::Error;

use crate::mm::{VirtAddr, VmError};

pub type Result<T> = core::result::Result<T, SyscallError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyscallError {
    #[error("{1}")]
    ParamInvalid(isize, String),

    #[error("could not find given fd: {1}, or it is invalid")]
    FdInvalid(isize, isize),

    #[error("reach va: {1:?}, which is not accessible")]
    InvalidVirtAddress(isize, VirtAddr),

    #[error("mmap length should bigger than 0")]
    MmapLengthNotBigEnough(isize),

    #[error("unsupported mmap flags: {1:#x}")]
    MmapFlagsNotSupported(isize, usize),

    #[error("file {1} can not be mapped with the requested access")]
    FileAccessDenied(isize, String),

    #[error("file does not support mmap")]
    MmapNotSupported(isize),

    #[error("offset plus length overflows")]
    MmapRangeOverflow(isize),

    #[error("brk {1:#x} is out of range")]
    BrkOutOfRange(isize, usize),

    #[error(transparent)]
    Vm(#[from] VmError),
}

impl SyscallError {
    pub fn error_code(&self) -> isize {
        match self {
            SyscallError::ParamInvalid(error_code, _) => *error_code,
            SyscallError::FdInvalid(error_code, _) => *error_code,
            SyscallError::InvalidVirtAddress(error_code, _) => *error_code,
            SyscallError::MmapLengthNotBigEnough(error_code) => *error_code,
            SyscallError::MmapFlagsNotSupported(error_code, _) => *error_code,
            SyscallError::FileAccessDenied(error_code, _) => *error_code,
            SyscallError::MmapNotSupported(error_code) => *error_code,
            SyscallError::MmapRangeOverflow(error_code) => *error_code,
            SyscallError::BrkOutOfRange(error_code, _) => *error_code,
            SyscallError::Vm(err) => -err.errno(),
        }
    }
}

//! 虚存子系统内部产生的错误

use thiserror::Error;

use super::MmapProts;
use crate::syscall::errno::*;

pub type VmResult<T> = core::result::Result<T, VmError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    #[error("no free physical frame")]
    OutOfMemory,

    #[error("no free range of {0} pages in user address space")]
    NoSpace(usize),

    #[error("page {0:#x} is not mapped")]
    NotMapped(usize),

    #[error("access {1:?} at {0:#x} violates region protection")]
    Protection(usize, MmapProts),

    #[error("page {0} has no backing store to write to")]
    NoBackingStore(usize),

    #[error("backing store failed on page {0}")]
    Io(usize),

    #[error("vnode does not support mmap")]
    NoMmap,

    #[error("region {0:#x}-{1:#x} has no memory object")]
    NoObject(usize, usize),
}

impl VmError {
    pub fn errno(&self) -> isize {
        match self {
            VmError::OutOfMemory => ENOMEM,
            VmError::NoSpace(_) => ENOMEM,
            VmError::NotMapped(_) => EFAULT,
            VmError::Protection(..) => EFAULT,
            VmError::NoBackingStore(_) => EINVAL,
            VmError::Io(_) => EIO,
            VmError::NoMmap => ENODEV,
            VmError::NoObject(..) => EINVAL,
        }
    }
}

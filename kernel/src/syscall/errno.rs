//! Linux 错误码，系统调用的错误都存储于 [`errno`] 中
//!
//! [`errno`]: <https://man7.org/linux/man-pages/man3/errno.3.html>

#![allow(unused)]

/// Operation not permitted
pub const EPERM: isize = 1;
/// No such file or directory
pub const ENOENT: isize = 2;
/// Bad file number
pub const EBADF: isize = 9;
/// Out of memory
pub const ENOMEM: isize = 12;
/// Permission denied
pub const EACCES: isize = 13;
/// Bad address
pub const EFAULT: isize = 14;
/// No such device
pub const ENODEV: isize = 19;
/// Invalid argument
pub const EINVAL: isize = 22;
/// I/O error
pub const EIO: isize = 5;
/// Value too large for defined data type
pub const EOVERFLOW: isize = 75;
/// Operation not supported on transport endpoint
pub const EOPNOTSUPP: isize = 95;
pub const ENOTSUP: isize = EOPNOTSUPP;

//! 教学内核的虚拟内存子系统
//!
//! 地址空间由区域表 [`mm::Vmmap`] 描述，每个区域背后是一个内存对象；私有映射与 fork
//! 通过影子对象链实现写时复制。页表、调度器、文件系统与进程管理由内核其余部分提供，
//! 本 crate 只通过 trait 使用它们。

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate alloc;

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod console;
pub mod consts;
pub mod fs;
pub mod logging;
pub mod mm;
pub mod syscall;
pub mod task;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests_prop;

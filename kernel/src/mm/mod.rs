//! 虚拟内存子系统
//!
//! - [`Vmmap`]: 进程地址空间的区域表
//! - [`MmObj`]: 区域背后的内存对象（匿名、影子、文件）
//! - [`PframeCache`]: 以 (对象, 页号) 为键的物理页帧缓存
//! - [`handle_pagefault`]: 用户态缺页处理
//! - [`MemorySet`]: 一个进程的映射表、页表与堆

mod address;
mod error;
mod frame_allocator;
mod memory_set;
mod mmobj;
mod page_table;
mod pagefault;
mod pframe;
mod vma;
mod vmmap;

pub use address::*;
pub use error::{VmError, VmResult};
pub use frame_allocator::{FrameAllocator, StackFrameAllocator};
pub use memory_set::MemorySet;
pub use mmobj::{MmObj, MmObjKind, VmaLink};
pub use page_table::{PTEFlags, PageTable};
pub use pagefault::{handle_pagefault, resolve_fault, FaultCause};
pub use pframe::{Pframe, PframeCache};
pub use vma::{MmapFlags, MmapProts, Vmarea};
pub use vmmap::{Direction, Vmmap};

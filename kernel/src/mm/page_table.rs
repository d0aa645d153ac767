//! 页表接口
//!
//! 具体的页表格式由体系结构相关代码实现，虚存子系统只通过 [`PageTable`] 安装、
//! 撤销映射以及刷新 TLB。

use super::address::{PhysAddr, VirtAddr};

bitflags! {
    /// 页目录项与页表项共用的标志位
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PTEFlags: u16 {
        /// 如果该位置零，MMU 转换时会引发 Page Fault
        const V = 1 << 0;
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        /// 该页在用户态是否可以访问
        const U = 1 << 4;
    }
}

impl PTEFlags {
    /// 用户页目录项总是可写可访问，真正的权限由末级页表项决定
    pub fn user_dir() -> Self {
        PTEFlags::V | PTEFlags::W | PTEFlags::U
    }
}

/// 一个进程的页表（页目录）
pub trait PageTable: Send + Sync {
    /// 将 `vaddr` 所在页映射到物理地址 `paddr`，中间级目录项使用 `dir_flags`
    fn map(&self, vaddr: VirtAddr, paddr: PhysAddr, dir_flags: PTEFlags, page_flags: PTEFlags);
    /// 撤销 `[start, end)` 内所有页的映射，未映射的页直接跳过
    fn unmap_range(&self, start: VirtAddr, end: VirtAddr);
    /// 刷新 `[start, start + len)` 范围内的 TLB
    fn flush_range(&self, start: VirtAddr, len: usize);
    fn flush_all(&self);
}

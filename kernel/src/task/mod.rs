//! 进程一侧的接口
//!
//! 虚存子系统不管理进程本身，只通过 [`Process`] 取得地址空间、打开的文件，
//! 以及在致命缺页时终止进程。

mod wait_queue;

pub use wait_queue::{Scheduler, WaitQueue};

use crate::fs::File;
use crate::mm::{MemorySet, MmapProts, PageTable, VirtAddr, VmResult};
use alloc::sync::Arc;
use spin::RwLock;

pub trait Process: Send + Sync {
    fn pid(&self) -> usize;

    fn memory_set(&self) -> &RwLock<MemorySet>;

    /// 文件描述符表中的打开文件
    fn fget(&self, fd: isize) -> Option<Arc<dyn File>>;

    /// 以 `status` 终止进程
    fn kill(&self, status: isize);

    /// `vaddr` 所在区域是否允许 `rights` 访问
    fn check_access(&self, vaddr: VirtAddr, rights: MmapProts) -> bool {
        let memory_set = self.memory_set().read();
        memory_set
            .vmmap()
            .lookup(vaddr.floor().0)
            .is_some_and(|vma| vma.prot().contains(rights))
    }
}

/// fork 时复制父进程的地址空间，子进程使用页表 `child_pt`
pub fn clone_address_space(
    parent: &dyn Process,
    child_pt: Arc<dyn PageTable>,
) -> VmResult<MemorySet> {
    let mut memory_set = parent.memory_set().write();
    memory_set.from_copy_on_write(child_pt)
}

//! 用户态缺页处理
//!
//! 缺页时找到覆盖该地址的区域，检查访问权限，从区域的内存对象取得页帧并安装页表项。
//! 私有区域的对象是影子对象，写缺页会在其中建立私有副本；因此同一地址先读后写时，
//! 第二次缺页会重新走一遍这条路径并完成写时复制。

use super::address::{pn_to_addr, VirtAddr};
use super::error::{VmError, VmResult};
use super::page_table::PTEFlags;
use super::vma::MmapProts;
use crate::syscall::errno::EFAULT;
use crate::task::Process;

bitflags! {
    /// 缺页原因
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FaultCause: u32 {
        /// 页表项存在（权限不符）
        const PRESENT = 1 << 0;
        const WRITE = 1 << 1;
        const USER = 1 << 2;
        /// 页表项保留位被置位
        const RESERVED = 1 << 3;
        const EXEC = 1 << 4;
    }
}

impl FaultCause {
    /// 本次访问需要的权限
    pub fn access(&self) -> MmapProts {
        if self.contains(FaultCause::WRITE) {
            MmapProts::PROT_WRITE
        } else if self.contains(FaultCause::EXEC) {
            MmapProts::PROT_EXEC
        } else if self.contains(FaultCause::RESERVED) {
            // 保留位错误不要求任何访问权限，任何区域都能通过检查
            MmapProts::PROT_NONE
        } else {
            MmapProts::PROT_READ
        }
    }
}

/// 由陷入处理程序调用，无法处理的缺页会以 EFAULT 终止进程
pub fn handle_pagefault(proc: &dyn Process, vaddr: VirtAddr, cause: FaultCause) {
    if let Err(err) = resolve_fault(proc, vaddr, cause) {
        error!(
            "[pagefault] pid {} vaddr {:#x} cause {:?}: {}",
            proc.pid(),
            vaddr.0,
            cause,
            err
        );
        #[cfg(feature = "dev")]
        error!("[pagefault] mappings:\n{}", proc.memory_set().read().vmmap());
        proc.kill(EFAULT);
    }
}

pub fn resolve_fault(proc: &dyn Process, vaddr: VirtAddr, cause: FaultCause) -> VmResult<()> {
    let vfn = vaddr.floor().0;
    let (obj, pagenum, page_table, cache) = {
        let memory_set = proc.memory_set().read();
        let vma = memory_set
            .vmmap()
            .lookup(vfn)
            .ok_or(VmError::NotMapped(vfn))?;
        let obj = vma
            .obj()
            .ok_or(VmError::NoObject(vma.start_addr(), vma.end_addr()))?
            .clone();
        (
            obj,
            vma.pagenum(vfn),
            memory_set.page_table().clone(),
            memory_set.cache().clone(),
        )
    };

    let access = cause.access();
    if !proc.check_access(vaddr, access) {
        return Err(VmError::Protection(vaddr.0, access));
    }

    let forwrite = cause.contains(FaultCause::WRITE);
    let pf = if obj.is_shadow() {
        obj.lookuppage(&cache, pagenum, forwrite)?
    } else {
        cache.get(&obj, pagenum)?
    };

    let mut flags = PTEFlags::V | PTEFlags::U;
    if forwrite {
        cache.dirty(&pf)?;
        flags |= PTEFlags::W;
    }
    trace!(
        "[pagefault] map {:#x} -> {:#x} {:?}",
        pn_to_addr(vfn),
        pf.paddr().0,
        flags
    );
    page_table.map(
        VirtAddr(pn_to_addr(vfn)),
        pf.paddr(),
        PTEFlags::user_dir(),
        flags,
    );
    Ok(())
}

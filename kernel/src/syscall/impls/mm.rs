//! 内存管理系统调用

use crate::{
    consts::{PAGE_SIZE, USER_MEM_HIGH, USER_MEM_LOW},
    fs::VnodeKind,
    mm::{
        addr_to_pn, page_aligned, page_round_up, pn_to_addr, Direction, MmapFlags, MmapProts,
        VirtAddr,
    },
    task::Process,
};

use super::super::errno::*;
use super::super::error::*;

/// `[addr, addr + len)` 完全落在用户地址空间内
fn user_range_ok(addr: usize, len: usize) -> bool {
    addr >= USER_MEM_LOW && addr.checked_add(len).is_some_and(|end| end <= USER_MEM_HIGH)
}

/// #define SYS_brk 214
///
/// 功能：修改数据段的大小；
///
/// 输入：指定待修改的地址，为 0 时只查询；
///
/// 返回值：成功返回新的 break，失败返回 -ENOMEM;
///
/// 堆是覆盖 `[ceil(brk_start), ceil(brk))` 的一个私有匿名区域。
///
/// ```c
/// uintptr_t brk;
/// uintptr_t ret = syscall(SYS_brk, brk);
/// ```
pub fn do_brk(proc: &dyn Process, addr: usize) -> Result<isize> {
    let mut memory_set = proc.memory_set().write();
    if addr == 0 {
        return Ok(memory_set.brk as isize);
    }
    if addr < memory_set.brk_start || addr > USER_MEM_HIGH {
        return_errno!(
            SyscallError::BrkOutOfRange(-ENOMEM, addr),
            "heap starts at {:#x}",
            memory_set.brk_start
        );
    }

    let heap_lo = addr_to_pn(page_round_up(memory_set.brk_start));
    let old_hi = addr_to_pn(page_round_up(memory_set.brk)).max(heap_lo);
    let new_hi = addr_to_pn(page_round_up(addr));

    if new_hi > old_hi {
        if !memory_set.vmmap().is_range_empty(old_hi, new_hi - old_hi) {
            return_errno!(SyscallError::BrkOutOfRange(-ENOMEM, addr), "heap collides with a mapping");
        }
        let grow_in_place = old_hi > heap_lo
            && memory_set
                .vmmap()
                .lookup(old_hi - 1)
                .is_some_and(|vma| vma.end() == old_hi && !vma.is_shared());
        if grow_in_place {
            memory_set.vmmap_mut().extend(old_hi - 1, new_hi)?;
        } else {
            memory_set.map_area(
                None,
                old_hi,
                new_hi - old_hi,
                MmapProts::PROT_READ | MmapProts::PROT_WRITE,
                MmapFlags::MAP_PRIVATE | MmapFlags::MAP_ANONYMOUS,
                0,
                Direction::LowToHigh,
            )?;
        }
    } else if new_hi < old_hi {
        memory_set.remove_area(new_hi, old_hi - new_hi)?;
        memory_set.page_table().flush_all();
    }

    debug!(
        "[do_brk] brk {:#x} -> {:#x}, heap pages {:#x}..{:#x}",
        memory_set.brk, addr, heap_lo, new_hi
    );
    memory_set.brk = addr;
    Ok(addr as isize)
}

/// #define SYS_munmap 215
///
/// 功能：将文件或设备取消映射到内存中；
///
/// 输入：映射的指定地址及区间；
///
/// 返回值：成功返回0，失败返回 -EINVAL;
///
/// ```c
/// void *start, size_t len
/// int ret = syscall(SYS_munmap, start, len);
/// ```
pub fn do_munmap(proc: &dyn Process, addr: usize, length: usize) -> Result<isize> {
    if !page_aligned(addr) {
        return_errno!(SyscallError::InvalidVirtAddress(-EINVAL, VirtAddr(addr)));
    }
    let length = page_round_up(length);
    if length == 0 {
        return_errno!(SyscallError::MmapLengthNotBigEnough(-EINVAL));
    }
    if !user_range_ok(addr, length) {
        return_errno!(
            SyscallError::InvalidVirtAddress(-EINVAL, VirtAddr(addr)),
            "range {:#x}+{:#x} leaves user memory",
            addr,
            length
        );
    }

    let mut memory_set = proc.memory_set().write();
    memory_set.remove_area(addr_to_pn(addr), length / PAGE_SIZE)?;
    memory_set.page_table().flush_all();
    Ok(0)
}

/// #define SYS_mmap 222
///
/// 功能：将文件或设备映射到内存中；
///
/// 输入：
///
/// - start: 映射起始位置，
/// - len: 长度，
/// - prot: 映射的内存保护方式，可取：PROT_EXEC, PROT_READ, PROT_WRITE, PROT_NONE
/// - flags: 映射是否与其他进程共享的标志，
/// - fd: 文件句柄，
/// - off: 文件偏移量；
///
/// 返回值：成功返回已映射区域的指针，失败返回负的错误码;
///
/// 参数全部校验通过之后才会修改地址空间。
///
/// ```c
/// void *start, size_t len, int prot, int flags, int fd, off_t off
/// long ret = syscall(SYS_mmap, start, len, prot, flags, fd, off);
/// ```
pub fn do_mmap(
    proc: &dyn Process,
    addr: usize,
    length: usize,
    prot: usize,
    flags: usize,
    fd: isize,
    offset: usize,
) -> Result<isize> {
    if !page_aligned(offset) {
        return_errno!(SyscallError::ParamInvalid(
            -EINVAL,
            format!("mmap offset {:#x} is not page aligned", offset)
        ));
    }
    let Some(flags) = MmapFlags::from_bits(flags) else {
        return_errno!(SyscallError::MmapFlagsNotSupported(-EOPNOTSUPP, flags));
    };
    let Some(prot) = MmapProts::from_bits(prot) else {
        return_errno!(SyscallError::ParamInvalid(
            -EINVAL,
            format!("unknown mmap prot {:#x}", prot)
        ));
    };
    let length = page_round_up(length);
    if length == 0 {
        return_errno!(SyscallError::MmapLengthNotBigEnough(-EINVAL));
    }
    if flags.contains(MmapFlags::MAP_SHARED) == flags.contains(MmapFlags::MAP_PRIVATE) {
        return_errno!(SyscallError::ParamInvalid(
            -EINVAL,
            format!("mmap needs exactly one of MAP_SHARED and MAP_PRIVATE: {:?}", flags)
        ));
    }
    let fixed = flags.contains(MmapFlags::MAP_FIXED);
    if fixed && (addr == 0 || !page_aligned(addr) || !user_range_ok(addr, length)) {
        return_errno!(
            SyscallError::InvalidVirtAddress(-EINVAL, VirtAddr(addr)),
            "fixed mapping {:#x}+{:#x}",
            addr,
            length
        );
    }

    let vnode = if flags.contains(MmapFlags::MAP_ANONYMOUS) {
        None
    } else {
        let Some(file) = proc.fget(fd) else {
            return_errno!(SyscallError::FdInvalid(-EBADF, fd));
        };
        if offset.checked_add(length).is_none() {
            return_errno!(SyscallError::MmapRangeOverflow(-EOVERFLOW));
        }
        let vnode = file.vnode();
        let shared = flags.contains(MmapFlags::MAP_SHARED);
        let wants_write = prot.contains(MmapProts::PROT_WRITE);
        let denied = (file.append_only() && wants_write)
            || (!shared && !file.readable())
            || !matches!(vnode.kind(), VnodeKind::Regular | VnodeKind::CharDevice)
            || (shared && wants_write && !(file.readable() && file.writable()));
        if denied {
            return_errno!(
                SyscallError::FileAccessDenied(-EACCES, file.name().into()),
                "prot {:?} flags {:?}",
                prot,
                flags
            );
        }
        if !vnode.has_mmap() {
            return_errno!(SyscallError::MmapNotSupported(-ENODEV));
        }
        Some(vnode)
    };

    let lopage = if fixed { addr_to_pn(addr) } else { 0 };
    let mut memory_set = proc.memory_set().write();
    let start = memory_set.map_area(
        vnode.as_deref(),
        lopage,
        length / PAGE_SIZE,
        prot,
        flags,
        offset / PAGE_SIZE,
        Direction::LowToHigh,
    )?;
    let start_va = VirtAddr(pn_to_addr(start));
    memory_set.page_table().flush_range(start_va, length);
    Ok(start_va.0 as isize)
}

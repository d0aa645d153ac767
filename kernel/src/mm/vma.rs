use super::address::pn_to_addr;
use super::mmobj::{MmObj, VmaLink};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MmapProts: usize {
        const PROT_NONE = 0;  // 不可读不可写不可执行，用于实现防范攻击的guard page等
        const PROT_READ = 1 << 0;
        const PROT_WRITE = 1 << 1;
        const PROT_EXEC  = 1 << 2;
    }
}

bitflags! {
    /// - MAP_SHARED: 共享映射，修改对所有映射同一对象的进程可见
    /// - MAP_PRIVATE: 私有映射，利用 COW 机制，修改只对本进程可见
    /// - MAP_FIXED: 将映射放在 addr 指定的地址上，若与现有映射重叠，则丢弃重叠部分
    /// - MAP_ANONYMOUS: 匿名映射，初始化全为0的内存空间
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MmapFlags: usize {
        const MAP_SHARED = 0x01;
        const MAP_PRIVATE = 0x02;
        const MAP_FIXED = 0x10;
        const MAP_ANONYMOUS = 0x20;
    }
}

static NEXT_VMA_ID: AtomicUsize = AtomicUsize::new(1);

/// 地址空间中的一段连续虚拟页 `[start, end)`
///
/// `off` 是 `start` 对应的页在内存对象中的页号。
#[derive(Debug)]
pub struct Vmarea {
    id: usize,
    pub(super) start: usize,
    pub(super) end: usize,
    pub(super) off: usize,
    pub(super) prot: MmapProts,
    pub(super) flags: MmapFlags,
    /// 所属地址空间，插入时设置
    pub(super) map_id: usize,
    pub(super) obj: Option<Arc<MmObj>>,
}

impl Vmarea {
    pub(super) fn new(start: usize, end: usize, off: usize, prot: MmapProts, flags: MmapFlags) -> Self {
        assert!(start < end, "empty vmarea {:#x}..{:#x}", start, end);
        Self {
            id: NEXT_VMA_ID.fetch_add(1, Ordering::Relaxed),
            start,
            end,
            off,
            prot,
            flags,
            map_id: 0,
            obj: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }
    pub fn start(&self) -> usize {
        self.start
    }
    pub fn end(&self) -> usize {
        self.end
    }
    pub fn npages(&self) -> usize {
        self.end - self.start
    }
    pub fn off(&self) -> usize {
        self.off
    }
    pub fn prot(&self) -> MmapProts {
        self.prot
    }
    pub fn map_id(&self) -> usize {
        self.map_id
    }
    pub fn obj(&self) -> Option<&Arc<MmObj>> {
        self.obj.as_ref()
    }

    pub fn is_shared(&self) -> bool {
        self.flags.contains(MmapFlags::MAP_SHARED)
    }

    pub fn contains(&self, vfn: usize) -> bool {
        self.start <= vfn && vfn < self.end
    }

    /// 虚拟页 `vfn` 在内存对象中的页号
    pub fn pagenum(&self, vfn: usize) -> usize {
        debug_assert!(self.contains(vfn));
        self.off + (vfn - self.start)
    }

    pub fn start_addr(&self) -> usize {
        pn_to_addr(self.start)
    }
    pub fn end_addr(&self) -> usize {
        pn_to_addr(self.end)
    }

    pub(super) fn link(&self) -> VmaLink {
        VmaLink {
            map_id: self.map_id,
            vma_id: self.id,
        }
    }
}

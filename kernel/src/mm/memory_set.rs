//! 进程地址空间：映射表 + 页表 + 页帧缓存

use super::address::VirtAddr;
use super::error::{VmError, VmResult};
use super::mmobj::MmObj;
use super::page_table::PageTable;
use super::pframe::PframeCache;
use super::vma::{MmapFlags, MmapProts};
use super::vmmap::{Direction, Vmmap};
use crate::consts::{USER_MEM_HIGH, USER_MEM_LOW};
use crate::fs::Vnode;
use alloc::{sync::Arc, vec::Vec};

pub struct MemorySet {
    vmmap: Vmmap,
    page_table: Arc<dyn PageTable>,
    cache: Arc<PframeCache>,

    /// 堆的起始地址，堆区间为 `[ceil(brk_start), ceil(brk))`
    pub brk_start: usize,
    pub brk: usize,
}

impl MemorySet {
    pub fn new(page_table: Arc<dyn PageTable>, cache: Arc<PframeCache>) -> Self {
        Self {
            vmmap: Vmmap::new(),
            page_table,
            cache,
            brk_start: 0,
            brk: 0,
        }
    }

    pub fn vmmap(&self) -> &Vmmap {
        &self.vmmap
    }
    pub fn vmmap_mut(&mut self) -> &mut Vmmap {
        &mut self.vmmap
    }
    pub fn page_table(&self) -> &Arc<dyn PageTable> {
        &self.page_table
    }
    pub fn cache(&self) -> &Arc<PframeCache> {
        &self.cache
    }

    /// 建立映射，返回新区域的起始页号
    #[allow(clippy::too_many_arguments)]
    pub fn map_area(
        &mut self,
        file: Option<&dyn Vnode>,
        lopage: usize,
        npages: usize,
        prot: MmapProts,
        flags: MmapFlags,
        off: usize,
        dir: Direction,
    ) -> VmResult<usize> {
        let vma = self.vmmap.map(
            &self.cache,
            &*self.page_table,
            file,
            lopage,
            npages,
            prot,
            flags,
            off,
            dir,
        )?;
        Ok(vma.start())
    }

    pub fn remove_area(&mut self, lopage: usize, npages: usize) -> VmResult<()> {
        self.vmmap.remove(&self.cache, &*self.page_table, lopage, npages)
    }

    /// 从用户地址 `vaddr` 读入 `buf`
    pub fn copy_in(&self, vaddr: VirtAddr, buf: &mut [u8]) -> VmResult<()> {
        self.vmmap.read(&self.cache, vaddr.0, buf)
    }

    /// 将 `buf` 写到用户地址 `vaddr`
    pub fn copy_out(&self, vaddr: VirtAddr, buf: &[u8]) -> VmResult<()> {
        self.vmmap.write(&self.cache, &*self.page_table, vaddr.0, buf)
    }

    /// 以 COW 的方式复制一个地址空间
    ///
    /// - 共享区域：子进程直接引用同一个内存对象
    /// - 私有区域：原对象之上为父子各建一个影子对象，之后双方的写入互不可见
    ///
    /// 父进程的用户页表被整体撤销，下次访问时经缺页重新建立，从而经过新的影子对象。
    /// 若有区域没有内存对象，返回错误且父进程保持不变。
    pub fn from_copy_on_write(&mut self, child_pt: Arc<dyn PageTable>) -> VmResult<MemorySet> {
        let mut sources: Vec<(usize, Arc<MmObj>)> = Vec::with_capacity(self.vmmap.len());
        for vma in self.vmmap.iter() {
            let obj = vma
                .obj()
                .ok_or(VmError::NoObject(vma.start_addr(), vma.end_addr()))?;
            sources.push((vma.start(), obj.clone()));
        }

        let mut child = MemorySet {
            vmmap: self.vmmap.clone_map(),
            page_table: child_pt,
            cache: self.cache.clone(),
            brk_start: self.brk_start,
            brk: self.brk,
        };

        for (start, old) in sources {
            let Some(child_vma) = child.vmmap.area_mut(start) else {
                continue;
            };
            let child_obj = if child_vma.is_shared() {
                old.incref();
                old.clone()
            } else {
                // 父区域原有的引用转给父影子对象，子影子对象另取一个
                old.incref();
                let parent_shadow = MmObj::new_shadow(old.clone());
                if let Some(parent_vma) = self.vmmap.area_mut(start) {
                    parent_vma.obj = Some(parent_shadow);
                }
                MmObj::new_shadow(old.clone())
            };
            old.bottom().add_vma(child_vma.link());
            child_vma.obj = Some(child_obj);
        }

        self.page_table
            .unmap_range(USER_MEM_LOW.into(), USER_MEM_HIGH.into());
        self.page_table.flush_all();
        debug!(
            "[MemorySet] fork map {} into map {} with {} areas",
            self.vmmap.id(),
            child.vmmap.id(),
            child.vmmap.len()
        );
        Ok(child)
    }
}

impl Drop for MemorySet {
    fn drop(&mut self) {
        self.vmmap.clear(&self.cache, &*self.page_table);
    }
}

//! 进程地址空间映射表
//!
//! 区域按起始页号升序保存在 [`BTreeMap`] 中，任意两个区域互不重叠，
//! 且都落在 `[USER_PN_LOW, USER_PN_HIGH)` 之内。

use super::address::{addr_to_pn, pn_to_addr, VirtAddr, USER_PN_HIGH, USER_PN_LOW};
use super::error::{VmError, VmResult};
use super::mmobj::MmObj;
use super::page_table::PageTable;
use super::pframe::PframeCache;
use super::vma::{MmapFlags, MmapProts, Vmarea};
use crate::consts::PAGE_SIZE;
use crate::fs::Vnode;
use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use core::cmp::{max, min};
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

static NEXT_MAP_ID: AtomicUsize = AtomicUsize::new(1);

/// 空闲区间的搜索方向
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    LowToHigh,
    HighToLow,
}

pub struct Vmmap {
    id: usize,
    areas: BTreeMap<usize, Vmarea>,
}

impl Vmmap {
    pub fn new() -> Self {
        Self {
            id: NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed),
            areas: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// 按地址升序遍历区域
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Vmarea> {
        self.areas.values()
    }

    pub(super) fn area_mut(&mut self, start: usize) -> Option<&mut Vmarea> {
        self.areas.get_mut(&start)
    }

    /// 撤销全部区域并释放映射表
    pub fn destroy(mut self, cache: &PframeCache, pt: &dyn PageTable) {
        self.clear(cache, pt);
    }

    /// 撤销全部区域，释放它们对内存对象的引用
    pub fn clear(&mut self, cache: &PframeCache, pt: &dyn PageTable) {
        for (_, mut vma) in core::mem::take(&mut self.areas) {
            pt.unmap_range(vma.start_addr().into(), vma.end_addr().into());
            if let Some(obj) = vma.obj.take() {
                obj.bottom().remove_vma(vma.link());
                obj.put(cache);
            }
        }
    }

    /// 复制区域的布局，不复制内存对象（由 fork 负责接线）
    pub fn clone_map(&self) -> Self {
        let mut map = Vmmap::new();
        for vma in self.iter() {
            let mut copy = Vmarea::new(vma.start, vma.end, vma.off, vma.prot, vma.flags);
            copy.map_id = map.id;
            map.areas.insert(copy.start, copy);
        }
        map
    }

    /// 首次适配：寻找 `npages` 个连续空闲页，返回起始页号
    pub fn find_range(&self, npages: usize, dir: Direction) -> Option<usize> {
        assert!(npages > 0, "find_range for zero pages");
        match dir {
            Direction::LowToHigh => {
                let mut low = USER_PN_LOW;
                for vma in self.iter() {
                    if vma.start >= low && vma.start - low >= npages {
                        return Some(low);
                    }
                    low = max(low, vma.end);
                }
                (USER_PN_HIGH >= low && USER_PN_HIGH - low >= npages).then_some(low)
            }
            Direction::HighToLow => {
                let mut high = USER_PN_HIGH;
                for vma in self.iter().rev() {
                    if high >= vma.end && high - vma.end >= npages {
                        return Some(high - npages);
                    }
                    high = min(high, vma.start);
                }
                (high >= USER_PN_LOW && high - USER_PN_LOW >= npages).then(|| high - npages)
            }
        }
    }

    /// 包含虚拟页 `vfn` 的区域
    pub fn lookup(&self, vfn: usize) -> Option<&Vmarea> {
        self.areas
            .range(..=vfn)
            .next_back()
            .map(|(_, vma)| vma)
            .filter(|vma| vma.contains(vfn))
    }

    /// `[start, start + npages)` 在用户地址范围内且不与任何区域相交
    pub fn is_range_empty(&self, start: usize, npages: usize) -> bool {
        let Some(end) = start.checked_add(npages) else {
            return false;
        };
        if start < USER_PN_LOW || end > USER_PN_HIGH {
            return false;
        }
        // 区域互不重叠，只有起点在 end 之前的最后一个区域可能与之相交
        match self.areas.range(..end).next_back() {
            Some((_, vma)) => vma.end <= start,
            None => true,
        }
    }

    /// 插入一个已初始化的区域
    pub fn insert(&mut self, mut vma: Vmarea) {
        assert!(
            vma.start >= USER_PN_LOW && vma.end <= USER_PN_HIGH,
            "vmarea {:#x}..{:#x} is outside user memory",
            vma.start,
            vma.end
        );
        assert!(
            self.is_range_empty(vma.start, vma.npages()),
            "vmarea {:#x}..{:#x} overlaps an existing one",
            vma.start,
            vma.end
        );
        vma.map_id = self.id;
        trace!("[Vmmap {}] insert {:#x}..{:#x}", self.id, vma.start, vma.end);
        self.areas.insert(vma.start, vma);
    }

    /// 建立映射，返回新区域
    ///
    /// - `lopage == 0` 时由 [`Vmmap::find_range`] 选择位置
    /// - 否则先移除与 `[lopage, lopage + npages)` 重叠的部分（MAP_FIXED 语义）
    /// - 共享映射直接引用 `file` 的内存对象（匿名时新建匿名对象）
    /// - 私有映射在其上再加一层影子对象
    ///
    /// 失败时映射表保持不变。
    #[allow(clippy::too_many_arguments)]
    pub fn map(
        &mut self,
        cache: &PframeCache,
        pt: &dyn PageTable,
        file: Option<&dyn Vnode>,
        lopage: usize,
        npages: usize,
        prot: MmapProts,
        flags: MmapFlags,
        off: usize,
        dir: Direction,
    ) -> VmResult<&Vmarea> {
        assert!(npages > 0, "map zero pages");
        assert!(
            flags.contains(MmapFlags::MAP_SHARED) != flags.contains(MmapFlags::MAP_PRIVATE),
            "map needs exactly one of MAP_SHARED and MAP_PRIVATE: {:?}",
            flags
        );

        let start = if lopage == 0 {
            self.find_range(npages, dir).ok_or(VmError::NoSpace(npages))?
        } else {
            assert!(
                lopage >= USER_PN_LOW && lopage.saturating_add(npages) <= USER_PN_HIGH,
                "fixed map {:#x}+{} is outside user memory",
                lopage,
                npages
            );
            lopage
        };

        let mut vma = Vmarea::new(start, start + npages, off, prot, flags);
        vma.map_id = self.id;

        let backing = match file {
            Some(vnode) => {
                let obj = vnode.mmap(&vma)?;
                obj.incref();
                obj
            }
            None => MmObj::new_anon(),
        };
        let obj = if flags.contains(MmapFlags::MAP_PRIVATE) {
            MmObj::new_shadow(backing)
        } else {
            backing
        };
        obj.bottom().add_vma(vma.link());
        vma.obj = Some(obj);

        if lopage != 0 && !self.is_range_empty(start, npages) {
            self.remove(cache, pt, start, npages)?;
        }

        debug!(
            "[Vmmap {}] map {:#x}..{:#x} {:?} {:?} off {:#x}",
            self.id, vma.start, vma.end, prot, flags, off
        );
        self.insert(vma);
        self.areas.get(&start).ok_or(VmError::NotMapped(start))
    }

    /// 移除 `[lopage, lopage + npages)` 内的映射
    ///
    /// 与每个相交区域的关系分四种情况：
    ///
    /// ```text
    /// 1: [   ******    ]   中间挖洞，拆成两个区域
    /// 2: [      *******]** 覆盖尾部，缩短区域
    /// 3: *[*****        ]  覆盖头部，推进起点和偏移
    /// 4: **[***********]** 完全覆盖，删除区域
    /// ```
    pub fn remove(
        &mut self,
        cache: &PframeCache,
        pt: &dyn PageTable,
        lopage: usize,
        npages: usize,
    ) -> VmResult<()> {
        let hipage = lopage.saturating_add(npages);
        let hit: Vec<usize> = self
            .areas
            .range(..hipage)
            .filter(|(_, vma)| vma.end > lopage)
            .map(|(start, _)| *start)
            .collect();

        for key in hit {
            let Some(mut vma) = self.areas.remove(&key) else {
                continue;
            };
            let (start, end) = (vma.start, vma.end);

            if start < lopage && hipage < end {
                pt.unmap_range(pn_to_addr(lopage).into(), pn_to_addr(hipage).into());
                let mut tail = Vmarea::new(hipage, end, vma.off + (hipage - start), vma.prot, vma.flags);
                tail.map_id = self.id;
                if let Some(obj) = &vma.obj {
                    obj.incref();
                    obj.bottom().add_vma(tail.link());
                    tail.obj = Some(obj.clone());
                }
                vma.end = lopage;
                debug!(
                    "[Vmmap {}] split {:#x}..{:#x} into {:#x}..{:#x} and {:#x}..{:#x}",
                    self.id, start, end, vma.start, vma.end, tail.start, tail.end
                );
                self.areas.insert(vma.start, vma);
                self.areas.insert(tail.start, tail);
            } else if start < lopage {
                pt.unmap_range(pn_to_addr(lopage).into(), pn_to_addr(end).into());
                vma.end = lopage;
                debug!("[Vmmap {}] shrink {:#x}..{:#x} to end {:#x}", self.id, start, end, lopage);
                self.areas.insert(vma.start, vma);
            } else if hipage < end {
                pt.unmap_range(pn_to_addr(start).into(), pn_to_addr(hipage).into());
                vma.off += hipage - start;
                vma.start = hipage;
                debug!("[Vmmap {}] advance {:#x}..{:#x} to start {:#x}", self.id, start, end, hipage);
                self.areas.insert(vma.start, vma);
            } else {
                pt.unmap_range(pn_to_addr(start).into(), pn_to_addr(end).into());
                debug!("[Vmmap {}] drop {:#x}..{:#x}", self.id, start, end);
                if let Some(obj) = vma.obj.take() {
                    obj.bottom().remove_vma(vma.link());
                    obj.put(cache);
                }
            }
        }
        Ok(())
    }

    /// 将包含 `vfn` 的区域的终点推进到 `new_end`，新增部分必须空闲
    pub fn extend(&mut self, vfn: usize, new_end: usize) -> VmResult<()> {
        let (start, end) = match self.lookup(vfn) {
            Some(vma) => (vma.start, vma.end),
            None => return Err(VmError::NotMapped(vfn)),
        };
        if new_end <= end {
            return Ok(());
        }
        if !self.is_range_empty(end, new_end - end) {
            return Err(VmError::NoSpace(new_end - end));
        }
        if let Some(vma) = self.areas.get_mut(&start) {
            vma.end = new_end;
        }
        debug!("[Vmmap {}] extend {:#x}..{:#x} to end {:#x}", self.id, start, end, new_end);
        Ok(())
    }

    /// `[vaddr, vaddr + len)` 的每一页都已映射
    fn check_covered(&self, vaddr: usize, len: usize) -> VmResult<()> {
        if len == 0 {
            return Ok(());
        }
        let last = vaddr
            .checked_add(len - 1)
            .ok_or(VmError::NotMapped(addr_to_pn(vaddr)))?;
        let mut vfn = addr_to_pn(vaddr);
        while vfn <= addr_to_pn(last) {
            vfn = self.lookup(vfn).ok_or(VmError::NotMapped(vfn))?.end;
        }
        Ok(())
    }

    /// 从地址空间读取 `buf.len()` 字节
    pub fn read(&self, cache: &PframeCache, vaddr: usize, buf: &mut [u8]) -> VmResult<()> {
        self.check_covered(vaddr, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let addr = vaddr + done;
            let vfn = addr_to_pn(addr);
            let vma = self.lookup(vfn).ok_or(VmError::NotMapped(vfn))?;
            let obj = vma
                .obj()
                .ok_or(VmError::NoObject(vma.start_addr(), vma.end_addr()))?;
            let pf = obj.lookuppage(cache, vma.pagenum(vfn), false)?;

            let page_off = addr & (PAGE_SIZE - 1);
            let n = min(PAGE_SIZE - page_off, buf.len() - done);
            buf[done..done + n].copy_from_slice(&pf.bytes()[page_off..page_off + n]);
            done += n;
        }
        Ok(())
    }

    /// 向地址空间写入 `buf`
    ///
    /// 私有区域写入后会撤销该页的翻译，使进程下次访问时重新缺页并看到私有副本。
    pub fn write(
        &self,
        cache: &PframeCache,
        pt: &dyn PageTable,
        vaddr: usize,
        buf: &[u8],
    ) -> VmResult<()> {
        self.check_covered(vaddr, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let addr = vaddr + done;
            let vfn = addr_to_pn(addr);
            let vma = self.lookup(vfn).ok_or(VmError::NotMapped(vfn))?;
            let obj = vma
                .obj()
                .ok_or(VmError::NoObject(vma.start_addr(), vma.end_addr()))?;
            let pf = obj.lookuppage(cache, vma.pagenum(vfn), true)?;

            let page_off = addr & (PAGE_SIZE - 1);
            let n = min(PAGE_SIZE - page_off, buf.len() - done);
            cache.acquire_busy(&pf);
            pf.bytes()[page_off..page_off + n].copy_from_slice(&buf[done..done + n]);
            let dirtied = cache.dirty(&pf);
            cache.release_busy(&pf);
            dirtied?;

            if !vma.is_shared() {
                let page: VirtAddr = pn_to_addr(vfn).into();
                pt.unmap_range(page, pn_to_addr(vfn + 1).into());
                pt.flush_range(page, PAGE_SIZE);
            }
            done += n;
        }
        Ok(())
    }
}

impl Default for Vmmap {
    fn default() -> Self {
        Self::new()
    }
}

/// 映射表的文本形式，每个区域一行
impl fmt::Display for Vmmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>21} {:>5} {:>7} {:>8} {:>10} {:>12}",
            "VADDR RANGE", "PROT", "FLAGS", "MMOBJ", "OFFSET", "VFN RANGE"
        )?;
        for vma in self.iter() {
            let prot = vma.prot;
            writeln!(
                f,
                "{:#010x}-{:#010x}  {}{}{}  {:>7} {:>8} {:#07x} {:#07x}-{:#07x}",
                vma.start_addr(),
                vma.end_addr(),
                if prot.contains(MmapProts::PROT_READ) { 'r' } else { '-' },
                if prot.contains(MmapProts::PROT_WRITE) { 'w' } else { '-' },
                if prot.contains(MmapProts::PROT_EXEC) { 'x' } else { '-' },
                if vma.is_shared() { "SHARED" } else { "PRIVATE" },
                vma.obj().map_or(0, |obj| obj.id()),
                vma.off,
                vma.start,
                vma.end
            )?;
        }
        Ok(())
    }
}

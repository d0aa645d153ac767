//! 单元测试用的内存中协作者：页表、调度器、进程、文件

use crate::consts::PAGE_SIZE;
use crate::fs::{File, FileObject, Vnode, VnodeKind};
use crate::mm::{
    handle_pagefault, FaultCause, MemorySet, MmObj, PTEFlags, PageTable, PframeCache, PhysAddr,
    PhysPageNum, StackFrameAllocator, VirtAddr, VmError, VmResult, Vmarea,
};
use crate::task::{clone_address_space, Process, Scheduler, WaitQueue};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use spin::{Mutex, RwLock};

/// 以虚拟页号为键的页表
pub struct MockPageTable {
    entries: Mutex<BTreeMap<usize, (PhysAddr, PTEFlags)>>,
    unmaps: Mutex<Vec<(usize, usize)>>,
    flushes: AtomicUsize,
}

impl MockPageTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(BTreeMap::new()),
            unmaps: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
        })
    }

    pub fn translate(&self, vaddr: VirtAddr) -> Option<(PhysAddr, PTEFlags)> {
        self.entries.lock().get(&vaddr.floor().0).copied()
    }

    /// `[start, end)` 曾被一次 `unmap_range` 整体撤销，且现在没有任何翻译
    pub fn unmapped(&self, start: usize, end: usize) -> bool {
        let covered = self
            .unmaps
            .lock()
            .iter()
            .any(|&(lo, hi)| lo <= start && end <= hi);
        let empty = self
            .entries
            .lock()
            .range(start / PAGE_SIZE..end / PAGE_SIZE)
            .next()
            .is_none();
        covered && empty
    }

    /// `flush_all` 的调用次数
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl PageTable for MockPageTable {
    fn map(&self, vaddr: VirtAddr, paddr: PhysAddr, dir_flags: PTEFlags, page_flags: PTEFlags) {
        assert_eq!(dir_flags, PTEFlags::user_dir());
        assert!(paddr.is_aligned());
        self.entries
            .lock()
            .insert(vaddr.floor().0, (paddr, page_flags));
    }

    fn unmap_range(&self, start: VirtAddr, end: VirtAddr) {
        self.unmaps.lock().push((start.0, end.0));
        let mut entries = self.entries.lock();
        let doomed: Vec<usize> = entries
            .range(start.floor().0..end.ceil().0)
            .map(|(vpn, _)| *vpn)
            .collect();
        for vpn in doomed {
            entries.remove(&vpn);
        }
    }

    fn flush_range(&self, _start: VirtAddr, _len: usize) {}

    fn flush_all(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

/// 睡眠即让出 CPU，醒来后由调用者重新检查条件
pub struct YieldScheduler;

impl Scheduler for YieldScheduler {
    fn sleep_on(&self, queue: &WaitQueue) {
        queue.enqueue(0);
        std::thread::yield_now();
    }

    fn wakeup_on(&self, queue: &WaitQueue) -> bool {
        queue.dequeue().is_some()
    }

    fn broadcast_on(&self, queue: &WaitQueue) {
        queue.drain();
    }
}

/// 管理 `nframes` 个物理页的页帧缓存
pub fn new_cache(nframes: usize) -> Arc<PframeCache> {
    let base = 0x80000;
    Arc::new(PframeCache::new(
        StackFrameAllocator::new(PhysPageNum(base), PhysPageNum(base + nframes)),
        Arc::new(YieldScheduler),
    ))
}

/// 内存中的文件内容
pub struct MemFile {
    data: Mutex<Vec<u8>>,
}

impl MemFile {
    pub fn new(data: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(data.to_vec()),
        })
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl FileObject for MemFile {
    fn fillpage(&self, pagenum: usize, buf: &mut [u8]) -> VmResult<()> {
        let data = self.data.lock();
        buf.fill(0);
        let start = pagenum * PAGE_SIZE;
        if start < data.len() {
            let n = (data.len() - start).min(buf.len());
            buf[..n].copy_from_slice(&data[start..start + n]);
        }
        Ok(())
    }

    fn cleanpage(&self, pagenum: usize, buf: &[u8]) -> VmResult<()> {
        let mut data = self.data.lock();
        let start = pagenum * PAGE_SIZE;
        if start < data.len() {
            let n = (data.len() - start).min(buf.len());
            data[start..start + n].copy_from_slice(&buf[..n]);
        }
        Ok(())
    }
}

pub struct MockVnode {
    kind: VnodeKind,
    obj: Option<Arc<MmObj>>,
}

impl MockVnode {
    /// 可映射的普通文件，vnode 持有文件对象的一个引用
    pub fn regular(file: Arc<MemFile>) -> Arc<Self> {
        Arc::new(Self {
            kind: VnodeKind::Regular,
            obj: Some(MmObj::new_file(file)),
        })
    }

    pub fn directory() -> Arc<Self> {
        Arc::new(Self {
            kind: VnodeKind::Directory,
            obj: None,
        })
    }

    /// 不支持 mmap 的字符设备
    pub fn char_device() -> Arc<Self> {
        Arc::new(Self {
            kind: VnodeKind::CharDevice,
            obj: None,
        })
    }

    pub fn object(&self) -> Arc<MmObj> {
        self.obj.clone().expect("vnode has no memory object")
    }
}

impl Vnode for MockVnode {
    fn kind(&self) -> VnodeKind {
        self.kind
    }

    fn has_mmap(&self) -> bool {
        self.obj.is_some()
    }

    fn mmap(&self, _vma: &Vmarea) -> VmResult<Arc<MmObj>> {
        self.obj.clone().ok_or(VmError::NoMmap)
    }
}

pub struct MockFile {
    name: String,
    readable: bool,
    writable: bool,
    append: bool,
    vnode: Arc<MockVnode>,
}

impl MockFile {
    pub fn new(name: &str, readable: bool, writable: bool, vnode: Arc<MockVnode>) -> Self {
        Self {
            name: name.into(),
            readable,
            writable,
            append: false,
            vnode,
        }
    }

    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }
}

impl File for MockFile {
    fn readable(&self) -> bool {
        self.readable
    }
    fn writable(&self) -> bool {
        self.writable
    }
    fn append_only(&self) -> bool {
        self.append
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn vnode(&self) -> Arc<dyn Vnode> {
        self.vnode.clone()
    }
}

pub struct MockProcess {
    pid: usize,
    memory_set: RwLock<MemorySet>,
    pt: Arc<MockPageTable>,
    files: Mutex<Vec<Arc<dyn File>>>,
    killed: Mutex<Option<isize>>,
}

impl MockProcess {
    pub fn new(pid: usize, cache: Arc<PframeCache>) -> Self {
        let pt = MockPageTable::new();
        Self::with_memory_set(pid, MemorySet::new(pt.clone(), cache), pt)
    }

    fn with_memory_set(pid: usize, memory_set: MemorySet, pt: Arc<MockPageTable>) -> Self {
        Self {
            pid,
            memory_set: RwLock::new(memory_set),
            pt,
            files: Mutex::new(Vec::new()),
            killed: Mutex::new(None),
        }
    }

    pub fn page_table(&self) -> &Arc<MockPageTable> {
        &self.pt
    }

    /// 返回新文件描述符
    pub fn add_file(&self, file: MockFile) -> isize {
        let mut files = self.files.lock();
        files.push(Arc::new(file));
        files.len() as isize - 1
    }

    pub fn killed(&self) -> Option<isize> {
        *self.killed.lock()
    }

    pub fn fork(&self, pid: usize) -> VmResult<MockProcess> {
        let pt = MockPageTable::new();
        let memory_set = clone_address_space(self, pt.clone())?;
        let child = Self::with_memory_set(pid, memory_set, pt);
        *child.files.lock() = self.files.lock().clone();
        Ok(child)
    }
}

impl Process for MockProcess {
    fn pid(&self) -> usize {
        self.pid
    }

    fn memory_set(&self) -> &RwLock<MemorySet> {
        &self.memory_set
    }

    fn fget(&self, fd: isize) -> Option<Arc<dyn File>> {
        if fd < 0 {
            return None;
        }
        self.files.lock().get(fd as usize).cloned()
    }

    fn kill(&self, status: isize) {
        *self.killed.lock() = Some(status);
    }
}

/// 模拟用户态访问：缺少翻译（或写只读页）时走缺页处理，然后经页表访问物理页
fn user_access(proc: &MockProcess, vaddr: VirtAddr, len: usize, write: bool, mut f: impl FnMut(usize, &mut [u8])) {
    let cache = proc.memory_set().read().cache().clone();
    let mut done = 0;
    while done < len {
        let va = VirtAddr(vaddr.0 + done);
        let entry = proc.page_table().translate(va);
        let ok = match entry {
            Some((_, flags)) => !write || flags.contains(PTEFlags::W),
            None => false,
        };
        if !ok {
            let mut cause = FaultCause::USER;
            if write {
                cause |= FaultCause::WRITE;
            }
            if entry.is_some() {
                cause |= FaultCause::PRESENT;
            }
            handle_pagefault(proc, va, cause);
            assert!(proc.killed().is_none(), "fault at {:#x} killed the process", va.0);
        }

        let (paddr, _) = proc.page_table().translate(va).expect("fault left no translation");
        let pf = cache.frame_at(paddr.floor()).expect("translation to a free frame");
        let off = va.page_offset();
        let n = (PAGE_SIZE - off).min(len - done);
        f(done, &mut pf.bytes()[off..off + n]);
        done += n;
    }
}

pub fn user_store(proc: &MockProcess, vaddr: VirtAddr, data: &[u8]) {
    user_access(proc, vaddr, data.len(), true, |at, page| {
        page.copy_from_slice(&data[at..at + page.len()]);
    });
}

pub fn user_load(proc: &MockProcess, vaddr: VirtAddr, buf: &mut [u8]) {
    let len = buf.len();
    user_access(proc, vaddr, len, false, |at, page| {
        let n = page.len();
        buf[at..at + n].copy_from_slice(page);
    });
}

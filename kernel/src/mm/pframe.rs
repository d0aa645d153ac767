//! 物理页帧缓存
//!
//! 每个驻留页由 (内存对象, 页号) 唯一确定。页帧在填充或写入期间处于 busy 状态，
//! 其他线程看到 busy 时睡眠在页帧的等待队列上，被唤醒后重新检查。
//!
//! 驻留页持有其内存对象的一个引用，因此对象的引用计数等于驻留页数时，
//! 说明除了自身缓存之外已经没有引用者。

use super::address::{PhysAddr, PhysPageNum};
use super::error::{VmError, VmResult};
use super::frame_allocator::FrameAllocator;
use super::mmobj::MmObj;
use crate::consts::PAGE_SIZE;
use crate::task::{Scheduler, WaitQueue};
use alloc::{
    boxed::Box,
    sync::{Arc, Weak},
};
use core::fmt::{self, Debug, Formatter};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use hashbrown::{hash_map::Entry, HashMap};
use spin::{Mutex, MutexGuard};

pub struct Pframe {
    obj: Weak<MmObj>,
    obj_id: usize,
    pagenum: usize,
    ppn: PhysPageNum,
    pincount: AtomicUsize,
    busy: AtomicBool,
    dirty: AtomicBool,
    data: Mutex<Box<[u8]>>,
    waitq: WaitQueue,
}

impl Pframe {
    fn new(obj: &Arc<MmObj>, pagenum: usize, ppn: PhysPageNum) -> Self {
        Self {
            obj: Arc::downgrade(obj),
            obj_id: obj.id(),
            pagenum,
            ppn,
            pincount: AtomicUsize::new(0),
            busy: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            data: Mutex::new(vec![0u8; PAGE_SIZE].into_boxed_slice()),
            waitq: WaitQueue::new(),
        }
    }

    pub fn obj(&self) -> Option<Arc<MmObj>> {
        self.obj.upgrade()
    }
    pub fn obj_id(&self) -> usize {
        self.obj_id
    }
    pub fn pagenum(&self) -> usize {
        self.pagenum
    }
    pub fn ppn(&self) -> PhysPageNum {
        self.ppn
    }
    pub fn paddr(&self) -> PhysAddr {
        self.ppn.into()
    }

    pub fn pin(&self) {
        self.pincount.fetch_add(1, Ordering::AcqRel);
    }
    pub fn unpin(&self) {
        let prev = self.pincount.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "unpin on unpinned frame {:?}", self);
    }
    pub fn is_pinned(&self) -> bool {
        self.pincount.load(Ordering::Acquire) > 0
    }
    pub fn pincount(&self) -> usize {
        self.pincount.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
    /// 成功占用返回 `true`
    pub fn try_set_busy(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
    pub fn clear_busy(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn waitq(&self) -> &WaitQueue {
        &self.waitq
    }

    /// 页帧内容
    pub fn bytes(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.data.lock()
    }
}

impl Debug for Pframe {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "Pframe(obj={}, page={:#x}, ppn={:#x}, pin={}, busy={})",
            self.obj_id,
            self.pagenum,
            self.ppn.0,
            self.pincount(),
            self.is_busy()
        ))
    }
}

pub struct PframeCache {
    // (object id, page number) -> frame
    frames: Mutex<HashMap<(usize, usize), Arc<Pframe>>>,
    allocator: Mutex<Box<dyn FrameAllocator>>,
    sched: Arc<dyn Scheduler>,
}

impl PframeCache {
    pub fn new(allocator: impl FrameAllocator + 'static, sched: Arc<dyn Scheduler>) -> Self {
        Self {
            frames: Mutex::new(HashMap::new()),
            allocator: Mutex::new(Box::new(allocator)),
            sched,
        }
    }

    /// 当前驻留的页帧数
    pub fn nframes(&self) -> usize {
        self.frames.lock().len()
    }

    /// 分配器中尚可分配的物理页数
    pub fn free_frames(&self) -> usize {
        let (current, recycled, end, _) = self.allocator.lock().usage();
        end - current + recycled
    }

    /// 不等待 busy，直接查看缓存
    pub fn peek(&self, obj_id: usize, pagenum: usize) -> Option<Arc<Pframe>> {
        self.frames.lock().get(&(obj_id, pagenum)).cloned()
    }

    /// 查找已驻留的页，不会触发填充；页帧忙时睡眠等待后重新查找
    pub fn lookup(&self, obj: &MmObj, pagenum: usize) -> Option<Arc<Pframe>> {
        loop {
            let pf = self.peek(obj.id(), pagenum)?;
            if !pf.is_busy() {
                return Some(pf);
            }
            trace!("[PframeCache] wait for busy {:?}", pf);
            self.sched.sleep_on(pf.waitq());
        }
    }

    /// 取得 `obj` 的第 `pagenum` 页，不在缓存中则分配页帧并调用对象的 `fillpage`
    pub fn get(&self, obj: &Arc<MmObj>, pagenum: usize) -> VmResult<Arc<Pframe>> {
        if let Some(pf) = self.lookup(obj, pagenum) {
            return Ok(pf);
        }

        let ppn = self.allocator.lock().alloc().ok_or(VmError::OutOfMemory)?;
        let pf = Arc::new(Pframe::new(obj, pagenum, ppn));
        pf.busy.store(true, Ordering::Release);
        let inserted = match self.frames.lock().entry((obj.id(), pagenum)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(pf.clone());
                true
            }
        };
        if !inserted {
            // 睡眠期间被其他线程抢先装入
            self.allocator.lock().dealloc(ppn);
            return self.get(obj, pagenum);
        }
        obj.attach_page(pagenum);

        trace!("[PframeCache] fill {:?}", pf);
        let filled = obj.fillpage(self, &pf);
        self.release_busy(&pf);

        if let Err(err) = filled {
            warn!("[PframeCache] fill {:?} failed: {}", pf, err);
            if pf.is_pinned() {
                pf.unpin();
            }
            self.free(&pf);
            return Err(err);
        }
        Ok(pf)
    }

    /// 等待页帧离开 busy 状态
    pub fn wait_unbusy(&self, pf: &Pframe) {
        while pf.is_busy() {
            self.sched.sleep_on(pf.waitq());
        }
    }

    /// 占用页帧，已被占用时睡眠等待
    pub fn acquire_busy(&self, pf: &Pframe) {
        while !pf.try_set_busy() {
            self.sched.sleep_on(pf.waitq());
        }
    }

    /// 释放占用并唤醒全部等待者
    pub fn release_busy(&self, pf: &Pframe) {
        pf.clear_busy();
        self.sched.broadcast_on(pf.waitq());
    }

    /// 标记页帧为脏，首次标记时通知所属对象
    pub fn dirty(&self, pf: &Pframe) -> VmResult<()> {
        if pf.is_dirty() {
            return Ok(());
        }
        if let Some(obj) = pf.obj() {
            obj.dirtypage(pf)?;
        }
        pf.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// 将脏页写回所属对象的后备存储
    pub fn clean(&self, pf: &Pframe) -> VmResult<()> {
        if !pf.is_dirty() {
            return Ok(());
        }
        let Some(obj) = pf.obj() else {
            return Ok(());
        };
        self.acquire_busy(pf);
        let cleaned = obj.cleanpage(pf);
        if cleaned.is_ok() {
            pf.dirty.store(false, Ordering::Release);
        }
        self.release_busy(pf);
        cleaned
    }

    /// 释放页帧：移出缓存、归还物理页、撤销对所属对象的引用
    pub fn free(&self, pf: &Arc<Pframe>) {
        assert!(!pf.is_pinned(), "free pinned frame {:?}", pf);
        assert!(!pf.is_busy(), "free busy frame {:?}", pf);
        trace!("[PframeCache] free {:?}", pf);

        let removed = self.frames.lock().remove(&(pf.obj_id, pf.pagenum));
        debug_assert!(removed.is_some(), "{:?} is not resident", pf);
        self.allocator.lock().dealloc(pf.ppn);
        if let Some(obj) = pf.obj() {
            obj.detach_page(pf.pagenum);
        }
    }

    /// 按物理页号反查驻留页
    pub fn frame_at(&self, ppn: PhysPageNum) -> Option<Arc<Pframe>> {
        self.frames.lock().values().find(|pf| pf.ppn == ppn).cloned()
    }
}

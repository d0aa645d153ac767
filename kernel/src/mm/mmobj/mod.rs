//! 内存对象
//!
//! 内存对象是一段页的后备存储，有三种：匿名对象、影子对象（写时复制的间接层）
//! 和文件对象。引用计数是显式维护的：
//!
//! - 每个引用它的区域贡献 1
//! - 每个影子对象对其 `shadowed` 贡献 1
//! - 每个驻留页帧贡献 1
//!
//! 计数降到与驻留页数相等时，说明外部已无引用者，对象释放全部驻留页；
//! 影子对象随后再释放它对 `shadowed` 的引用。

mod anon;
mod shadow;

use super::error::VmResult;
use super::pframe::{Pframe, PframeCache};
use crate::fs::FileObject;
use alloc::{collections::BTreeSet, sync::Arc, vec::Vec};
use core::fmt::{self, Debug, Formatter};
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

static NEXT_OBJ_ID: AtomicUsize = AtomicUsize::new(1);

/// 区域在对象区域链表中的登记项，只用于枚举，不持有引用
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VmaLink {
    pub map_id: usize,
    pub vma_id: usize,
}

pub enum MmObjKind {
    Anon,
    Shadow {
        shadowed: Arc<MmObj>,
        /// 影子链末端的非影子对象
        bottom: Arc<MmObj>,
    },
    File(Arc<dyn FileObject>),
}

struct MmObjInner {
    refcount: usize,
    respages: BTreeSet<usize>,
    vmas: Vec<VmaLink>,
}

pub struct MmObj {
    id: usize,
    kind: MmObjKind,
    inner: Mutex<MmObjInner>,
}

impl MmObj {
    fn with_kind(kind: MmObjKind) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_OBJ_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            inner: Mutex::new(MmObjInner {
                refcount: 1,
                respages: BTreeSet::new(),
                vmas: Vec::new(),
            }),
        })
    }

    /// 文件对象，创建者（通常是 vnode）持有初始的一个引用
    pub fn new_file(source: Arc<dyn FileObject>) -> Arc<Self> {
        Self::with_kind(MmObjKind::File(source))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn kind(&self) -> &MmObjKind {
        &self.kind
    }

    pub fn is_shadow(&self) -> bool {
        matches!(self.kind, MmObjKind::Shadow { .. })
    }

    pub fn shadowed(&self) -> Option<&Arc<MmObj>> {
        match &self.kind {
            MmObjKind::Shadow { shadowed, .. } => Some(shadowed),
            _ => None,
        }
    }

    /// 影子链的底部对象，非影子对象返回自身
    pub fn bottom(self: &Arc<Self>) -> Arc<MmObj> {
        match &self.kind {
            MmObjKind::Shadow { bottom, .. } => bottom.clone(),
            _ => self.clone(),
        }
    }

    pub fn refcount(&self) -> usize {
        self.inner.lock().refcount
    }

    pub fn nrespages(&self) -> usize {
        self.inner.lock().respages.len()
    }

    pub fn respages(&self) -> Vec<usize> {
        self.inner.lock().respages.iter().copied().collect()
    }

    pub fn vmas(&self) -> Vec<VmaLink> {
        self.inner.lock().vmas.clone()
    }

    pub fn incref(&self) {
        let mut inner = self.inner.lock();
        assert!(inner.refcount > 0, "ref on released memory object {}", self.id);
        inner.refcount += 1;
    }

    /// 放弃一个引用，外部引用全部消失时释放驻留页
    pub fn put(&self, cache: &PframeCache) {
        let resident: Vec<usize> = {
            let mut inner = self.inner.lock();
            assert!(inner.refcount > 0, "put on released memory object {}", self.id);
            inner.refcount -= 1;
            if inner.refcount != inner.respages.len() {
                return;
            }
            inner.respages.iter().copied().collect()
        };

        debug!(
            "[MmObj] release obj {} with {} resident pages",
            self.id,
            resident.len()
        );
        for pagenum in resident {
            let Some(pf) = cache.peek(self.id, pagenum) else {
                continue;
            };
            if pf.is_pinned() {
                pf.unpin();
            }
            cache.wait_unbusy(&pf);
            cache.free(&pf);
        }
        debug_assert_eq!(self.refcount(), 0);

        if let MmObjKind::Shadow { shadowed, .. } = &self.kind {
            shadowed.put(cache);
        }
    }

    pub(crate) fn add_vma(&self, link: VmaLink) {
        self.inner.lock().vmas.push(link);
    }

    pub(crate) fn remove_vma(&self, link: VmaLink) {
        self.inner.lock().vmas.retain(|l| *l != link);
    }

    /// 新页帧装入缓存，页帧持有对象一个引用
    pub(crate) fn attach_page(&self, pagenum: usize) {
        let mut inner = self.inner.lock();
        assert!(inner.refcount > 0, "page {} attached to released object {}", pagenum, self.id);
        inner.refcount += 1;
        let fresh = inner.respages.insert(pagenum);
        assert!(fresh, "page {} of object {} is already resident", pagenum, self.id);
    }

    pub(crate) fn detach_page(&self, pagenum: usize) {
        let mut inner = self.inner.lock();
        if inner.respages.remove(&pagenum) {
            inner.refcount -= 1;
        }
    }

    /// 取得对象的第 `pagenum` 页，`forwrite` 时保证返回的页属于本对象
    pub fn lookuppage(
        self: &Arc<Self>,
        cache: &PframeCache,
        pagenum: usize,
        forwrite: bool,
    ) -> VmResult<Arc<Pframe>> {
        match &self.kind {
            MmObjKind::Shadow { bottom, .. } => shadow::lookuppage(self, bottom, cache, pagenum, forwrite),
            MmObjKind::Anon | MmObjKind::File(_) => cache.get(self, pagenum),
        }
    }

    /// 填充刚分配的页帧，调用时页帧必须处于 busy 且未被钉住
    pub fn fillpage(self: &Arc<Self>, cache: &PframeCache, pf: &Pframe) -> VmResult<()> {
        assert!(pf.is_busy(), "fillpage on idle frame {:?}", pf);
        assert!(!pf.is_pinned(), "fillpage on pinned frame {:?}", pf);
        pf.pin();
        match &self.kind {
            MmObjKind::Anon => anon::fillpage(pf),
            MmObjKind::Shadow { shadowed, bottom } => shadow::fillpage(shadowed, bottom, cache, pf),
            MmObjKind::File(source) => source.fillpage(pf.pagenum(), &mut pf.bytes()[..]),
        }
    }

    pub fn dirtypage(&self, pf: &Pframe) -> VmResult<()> {
        match &self.kind {
            MmObjKind::Anon => anon::dirtypage(pf),
            MmObjKind::Shadow { .. } => shadow::dirtypage(pf),
            MmObjKind::File(source) => source.dirtypage(pf.pagenum()),
        }
    }

    pub fn cleanpage(&self, pf: &Pframe) -> VmResult<()> {
        match &self.kind {
            MmObjKind::Anon => anon::cleanpage(pf),
            MmObjKind::Shadow { .. } => shadow::cleanpage(pf),
            MmObjKind::File(source) => source.cleanpage(pf.pagenum(), &pf.bytes()[..]),
        }
    }
}

impl Debug for MmObj {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            MmObjKind::Anon => "anon",
            MmObjKind::Shadow { .. } => "shadow",
            MmObjKind::File(_) => "file",
        };
        let inner = self.inner.lock();
        f.write_fmt(format_args!(
            "MmObj({} #{}, ref={}, res={})",
            kind,
            self.id,
            inner.refcount,
            inner.respages.len()
        ))
    }
}

//! 影子对象：写时复制的间接层
//!
//! 影子对象只保存被写过的页，其余页沿 `shadowed` 链向下查找，链尾的底部对象提供初始内容。

use super::{MmObj, MmObjKind};
use crate::mm::error::VmResult;
use crate::mm::pframe::{Pframe, PframeCache};
use alloc::sync::Arc;

impl MmObj {
    /// 在 `shadowed` 之上创建影子对象，新对象接管调用者对 `shadowed` 的一个引用
    pub fn new_shadow(shadowed: Arc<MmObj>) -> Arc<Self> {
        let bottom = shadowed.bottom();
        Self::with_kind(MmObjKind::Shadow { shadowed, bottom })
    }
}

/// 从 `from` 开始沿影子链查找驻留的第 `pagenum` 页，遇到非影子对象即停止
fn find_resident(cache: &PframeCache, from: &Arc<MmObj>, pagenum: usize) -> Option<Arc<Pframe>> {
    let mut cur = from.clone();
    loop {
        let next = match cur.kind() {
            MmObjKind::Shadow { shadowed, .. } => shadowed.clone(),
            _ => return None,
        };
        if let Some(pf) = cache.lookup(&cur, pagenum) {
            return Some(pf);
        }
        cur = next;
    }
}

pub(super) fn lookuppage(
    obj: &Arc<MmObj>,
    bottom: &Arc<MmObj>,
    cache: &PframeCache,
    pagenum: usize,
    forwrite: bool,
) -> VmResult<Arc<Pframe>> {
    let pf = match find_resident(cache, obj, pagenum) {
        Some(pf) => pf,
        None => cache.get(bottom, pagenum)?,
    };
    if forwrite && pf.obj_id() != obj.id() {
        // 写时复制：在本对象中建立私有副本
        return cache.get(obj, pagenum);
    }
    Ok(pf)
}

pub(super) fn fillpage(
    shadowed: &Arc<MmObj>,
    bottom: &Arc<MmObj>,
    cache: &PframeCache,
    pf: &Pframe,
) -> VmResult<()> {
    let src = match find_resident(cache, shadowed, pf.pagenum()) {
        Some(src) => src,
        None => cache.get(bottom, pf.pagenum())?,
    };
    pf.bytes().copy_from_slice(&src.bytes());
    Ok(())
}

pub(super) fn dirtypage(_pf: &Pframe) -> VmResult<()> {
    Ok(())
}

pub(super) fn cleanpage(_pf: &Pframe) -> VmResult<()> {
    Ok(())
}

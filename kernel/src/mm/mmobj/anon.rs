//! 匿名对象：没有后备存储，页面首次访问时填零

use super::{MmObj, MmObjKind};
use crate::mm::error::{VmError, VmResult};
use crate::mm::pframe::Pframe;
use alloc::sync::Arc;

impl MmObj {
    pub fn new_anon() -> Arc<Self> {
        Self::with_kind(MmObjKind::Anon)
    }
}

pub(super) fn fillpage(pf: &Pframe) -> VmResult<()> {
    pf.bytes().fill(0);
    Ok(())
}

pub(super) fn dirtypage(_pf: &Pframe) -> VmResult<()> {
    Ok(())
}

pub(super) fn cleanpage(pf: &Pframe) -> VmResult<()> {
    Err(VmError::NoBackingStore(pf.pagenum()))
}

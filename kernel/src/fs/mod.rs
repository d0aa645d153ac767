//! 文件系统一侧的接口
//!
//! 虚存子系统只关心打开文件的访问模式，以及 vnode 能否提供文件映射用的内存对象。

use crate::mm::{MmObj, VmError, VmResult, Vmarea};
use alloc::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VnodeKind {
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
}

pub trait Vnode: Send + Sync {
    fn kind(&self) -> VnodeKind;

    fn has_mmap(&self) -> bool {
        false
    }

    /// 返回该 vnode 的内存对象，不替调用者增加引用
    fn mmap(&self, _vma: &Vmarea) -> VmResult<Arc<MmObj>> {
        Err(VmError::NoMmap)
    }
}

/// 打开的文件
pub trait File: Send + Sync {
    fn readable(&self) -> bool;
    fn writable(&self) -> bool;
    /// 以 O_APPEND 打开
    fn append_only(&self) -> bool {
        false
    }
    fn name(&self) -> &str;
    fn vnode(&self) -> Arc<dyn Vnode>;
}

/// 文件映射对象的后备存储，由文件系统实现
pub trait FileObject: Send + Sync {
    /// 用文件第 `pagenum` 页的内容填充 `buf`，超出文件末尾的部分填零
    fn fillpage(&self, pagenum: usize, buf: &mut [u8]) -> VmResult<()>;

    fn dirtypage(&self, _pagenum: usize) -> VmResult<()> {
        Ok(())
    }

    /// 将 `buf` 写回文件第 `pagenum` 页
    fn cleanpage(&self, pagenum: usize, buf: &[u8]) -> VmResult<()>;
}

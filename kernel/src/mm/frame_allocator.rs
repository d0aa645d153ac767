use super::address::PhysPageNum;
use alloc::vec::Vec;

/// 物理页帧管理器
pub trait FrameAllocator: Send {
    /// 从空闲物理页中分配一个物理页
    fn alloc(&mut self) -> Option<PhysPageNum>;
    /// 回收物理页
    fn dealloc(&mut self, ppn: PhysPageNum);
    /// (已分配上界, 回收栈长度, 管理的结束页号, 管理的起始页号)
    fn usage(&self) -> (usize, usize, usize, usize);
}

/// 栈式物理页帧管理器
pub struct StackFrameAllocator {
    /// 管理内存的起始物理页号
    base_num: usize,
    /// 管理内存的结束物理页号
    end: usize,
    /// 空闲内存的起始物理页号
    current: usize,
    /// 以后入先出的方式保存被回收的物理页号
    recycled: Vec<usize>,
}

impl StackFrameAllocator {
    /// 管理物理页号 `[l, r)`
    pub fn new(l: PhysPageNum, r: PhysPageNum) -> Self {
        assert!(l <= r, "frame range {:?}..{:?} is inverted", l, r);
        Self {
            base_num: l.0,
            end: r.0,
            current: l.0,
            recycled: Vec::new(),
        }
    }
}

impl FrameAllocator for StackFrameAllocator {
    fn alloc(&mut self) -> Option<PhysPageNum> {
        // 首先检查栈 recycled 内有没有之前回收的物理页号，如果有的话直接弹出栈顶并返回
        if let Some(ppn) = self.recycled.pop() {
            Some(ppn.into())
        }
        // 空间满返回 None
        else if self.current == self.end {
            None
        }
        // 否则就返回最低的物理页号
        else {
            self.current += 1;
            Some((self.current - 1).into())
        }
    }

    fn dealloc(&mut self, ppn: PhysPageNum) {
        let ppn = ppn.0;
        // 验证物理页号有效性，PPN 大于已分配的最高内存或已释放栈中存在这个物理页号
        if ppn < self.base_num || ppn >= self.current || self.recycled.iter().any(|&v| v == ppn) {
            panic!(
                "[StackFrameAllocator::dealloc] Frame ppn={:#x} has not been allocated!",
                ppn
            );
        }
        // 回收，压栈
        self.recycled.push(ppn);
    }

    fn usage(&self) -> (usize, usize, usize, usize) {
        (self.current, self.recycled.len(), self.end, self.base_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycles_lifo_and_exhausts() {
        let mut fa = StackFrameAllocator::new(PhysPageNum(10), PhysPageNum(13));
        let a = fa.alloc().unwrap();
        let b = fa.alloc().unwrap();
        let c = fa.alloc().unwrap();
        assert_eq!((a.0, b.0, c.0), (10, 11, 12));
        assert!(fa.alloc().is_none());

        fa.dealloc(b);
        fa.dealloc(a);
        assert_eq!(fa.usage(), (13, 2, 13, 10));
        assert_eq!(fa.alloc(), Some(a));
        assert_eq!(fa.alloc(), Some(b));
        assert_eq!(fa.usage(), (13, 0, 13, 10));
    }

    #[test]
    #[should_panic]
    fn double_free_panics() {
        let mut fa = StackFrameAllocator::new(PhysPageNum(0), PhysPageNum(4));
        let a = fa.alloc().unwrap();
        fa.dealloc(a);
        fa.dealloc(a);
    }
}

//! 虚实地址抽象

use crate::consts::{PAGE_SHIFT, PAGE_SIZE, USER_MEM_HIGH, USER_MEM_LOW};

macro_rules! derive_wrap {
    ($($type_def:item)*) => {
        $(
            #[repr(C)]
            #[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
            $type_def
        )*
    };
}

derive_wrap! {
    pub struct PhysAddr(pub usize);
    pub struct VirtAddr(pub usize);
    pub struct PhysPageNum(pub usize);
    pub struct VirtPageNum(pub usize);
}

macro_rules! gen_usize_bridge {
    ($($addr_type:ident)*) => {
        $(
            impl From<$addr_type> for usize {
                fn from(value: $addr_type) -> Self {
                    value.0
                }
            }

            impl From<usize> for $addr_type {
                fn from(value: usize) -> Self {
                    Self(value)
                }
            }
        )*
    };
}

gen_usize_bridge! {
    PhysAddr
    VirtAddr
    PhysPageNum
    VirtPageNum
}

macro_rules! mk_convertion_bridge {
    ($($from:ident <=> $into:ident)*) => {
        $(
            impl From<$from> for $into {
                fn from(value: $from) -> Self {
                    assert!(value.is_aligned(), "{:?} is not page aligned", value);
                    value.floor()
                }
            }

            impl From<$into> for $from {
                fn from(value: $into) -> Self {
                    Self(value.0 << PAGE_SHIFT)
                }
            }
        )*
    };
}

mk_convertion_bridge! {
    PhysAddr <=> PhysPageNum
    VirtAddr <=> VirtPageNum
}

impl VirtAddr {
    /// 从虚拟地址计算虚拟页号（下取整）
    pub fn floor(&self) -> VirtPageNum {
        VirtPageNum(self.0 / PAGE_SIZE)
    }
    /// 从虚拟地址计算虚拟页号（上取整）
    pub fn ceil(&self) -> VirtPageNum {
        VirtPageNum(page_round_up(self.0) / PAGE_SIZE)
    }
    /// 从虚拟地址获取页内偏移
    pub fn page_offset(&self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }
    /// 判断虚拟地址是否与页面大小对齐
    pub fn is_aligned(&self) -> bool {
        self.page_offset() == 0
    }
    /// 是否落在用户地址空间 `[USER_MEM_LOW, USER_MEM_HIGH)` 内
    pub fn is_user(&self) -> bool {
        (USER_MEM_LOW..USER_MEM_HIGH).contains(&self.0)
    }
}

impl PhysAddr {
    /// 从物理地址计算物理页号（下取整）
    pub fn floor(&self) -> PhysPageNum {
        PhysPageNum(self.0 / PAGE_SIZE)
    }
    pub fn page_offset(&self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }
    pub fn is_aligned(&self) -> bool {
        self.page_offset() == 0
    }
}

/// 地址所在的页号
#[inline]
pub const fn addr_to_pn(addr: usize) -> usize {
    addr >> PAGE_SHIFT
}

/// 页号对应的起始地址
#[inline]
pub const fn pn_to_addr(pn: usize) -> usize {
    pn << PAGE_SHIFT
}

#[inline]
pub const fn page_aligned(addr: usize) -> bool {
    addr & (PAGE_SIZE - 1) == 0
}

/// 向上对齐到页边界，溢出时饱和到最后一个页边界
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    match addr.checked_add(PAGE_SIZE - 1) {
        Some(v) => v & !(PAGE_SIZE - 1),
        None => usize::MAX & !(PAGE_SIZE - 1),
    }
}

/// 用户地址空间的页号范围 `[low, high)`
pub const USER_PN_LOW: usize = addr_to_pn(USER_MEM_LOW);
pub const USER_PN_HIGH: usize = addr_to_pn(USER_MEM_HIGH);

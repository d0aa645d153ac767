pub const PAGE_SIZE: usize = 0x1000;
pub const PAGE_SHIFT: usize = 12;

/// 用户地址空间下界（含）
pub const USER_MEM_LOW: usize = 0x0040_0000;
/// 用户地址空间上界（不含）
pub const USER_MEM_HIGH: usize = 0xc000_0000;

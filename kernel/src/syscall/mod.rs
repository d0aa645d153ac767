//! 虚存相关的系统调用入口
//!
//! 入口函数先完整校验参数，全部通过后才修改地址空间。

pub mod errno;
pub mod error;
pub mod impls;

pub use impls::*;

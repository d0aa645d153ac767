//! 等待队列
//!
//! 队列本身只记录睡眠者的线程号，挂起与唤醒由 [`Scheduler`] 完成。

use alloc::{collections::VecDeque, vec::Vec};
use spin::Mutex;

pub struct WaitQueue {
    waiters: Mutex<VecDeque<usize>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    pub fn enqueue(&self, tid: usize) {
        self.waiters.lock().push_back(tid);
    }

    pub fn dequeue(&self) -> Option<usize> {
        self.waiters.lock().pop_front()
    }

    /// 取出全部睡眠者，用于广播唤醒
    pub fn drain(&self) -> Vec<usize> {
        self.waiters.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// 调度器提供的睡眠/唤醒原语
///
/// `sleep_on` 返回只说明线程被唤醒过，等待的条件需要调用者循环重新检查。
pub trait Scheduler: Send + Sync {
    /// 将当前线程挂在 `queue` 上并让出 CPU
    fn sleep_on(&self, queue: &WaitQueue);
    /// 唤醒 `queue` 上的一个线程，返回是否有线程被唤醒
    fn wakeup_on(&self, queue: &WaitQueue) -> bool;
    /// 唤醒 `queue` 上的全部线程
    fn broadcast_on(&self, queue: &WaitQueue);
}

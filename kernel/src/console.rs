//! 控制台输出
//!
//! 字符设备由内核在启动时通过 [`set_console`] 注册，注册之前的输出被丢弃。

use core::fmt::{self, Write};
use spin::{Mutex, Once};

/// 字符输出设备
pub trait ConsoleWrite: Send {
    fn putchar(&mut self, c: char);
}

static CONSOLE: Once<Mutex<&'static mut dyn ConsoleWrite>> = Once::new();

/// 注册控制台设备，只有第一次注册生效
pub fn set_console(dev: &'static mut dyn ConsoleWrite) {
    CONSOLE.call_once(|| Mutex::new(dev));
}

struct Stdout;

impl Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(console) = CONSOLE.get() {
            let mut dev = console.lock();
            for c in s.chars() {
                dev.putchar(c);
            }
        }
        Ok(())
    }
}

pub fn print(args: fmt::Arguments<'_>) {
    Stdout.write_fmt(args).unwrap();
}

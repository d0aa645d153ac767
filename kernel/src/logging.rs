use crate::console;
use log::{self, Level, LevelFilter, Log, Metadata, Record};

struct SimpleLogger;

static LOGGER: SimpleLogger = SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let color = match record.level() {
            Level::Error => 31, // 红色
            Level::Warn => 93,  // 黄色
            Level::Info => 34,  // 蓝色
            Level::Debug => 32, // 绿色
            Level::Trace => 36, // 青色
        };

        console::print(format_args!(
            "\u{1B}[{}m[{:>5}] {}:{} {}\u{1B}[0m\n",
            color,
            record.level(),
            record.file().unwrap_or("?"),
            record.line().unwrap_or(0),
            record.args(),
        ));
    }

    fn flush(&self) {}
}

fn level_from_env() -> LevelFilter {
    match option_env!("RUST_LOG") {
        Some(log_level) => match log_level {
            "ERROR" | "error" => LevelFilter::Error,
            "WARN" | "warn" => LevelFilter::Warn,
            "INFO" | "info" => LevelFilter::Info,
            "DEBUG" | "debug" => LevelFilter::Debug,
            "TRACE" | "trace" => LevelFilter::Trace,
            _ => LevelFilter::Off,
        },
        None => LevelFilter::Info,
    }
}

/// 安装日志器，重复调用不会出错
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_from_env());
    }
}

#[macro_export]
macro_rules! return_errno {
    ($errno:expr $(, $fmt:literal $(, $($arg: tt)+)?)?) => {
        let err = $errno;
        warn!("{}:{} syscall error: {}", file!(), line!(), err);
        $(warn!(concat!("error info: ", $fmt) $(, $($arg)+)?);)?
        return Err(err.into());
    };
}

pub mod mm;

pub use mm::*;

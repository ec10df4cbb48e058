//! Leveled logging over the serial transport.
//!
//! The kernel has no executor to hand records to, so this is a thin macro
//! layer rather than a `log`-crate backend: every record is formatted and
//! written to COM1 synchronously, with interrupts held off for the duration.

/// Severity prefix used by the leveled macros below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    const fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

#[doc(hidden)]
pub fn _log(level: Level, args: core::fmt::Arguments) {
    crate::serial_println!("[{}] {}", level.tag(), args);
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => ($crate::logging::_log($crate::logging::Level::Info, format_args!($($arg)*)));
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => ($crate::logging::_log($crate::logging::Level::Warn, format_args!($($arg)*)));
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => ($crate::logging::_log($crate::logging::Level::Error, format_args!($($arg)*)));
}

/// Logs a fatal record then diverges. The sole path that may panic the kernel.
#[macro_export]
macro_rules! kernel_panic {
    ($($arg:tt)*) => {{
        $crate::log_error!("PANIC: {}", format_args!($($arg)*));
        $crate::panic::kernel_panic(format_args!($($arg)*))
    }};
}

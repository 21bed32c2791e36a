// BRIGHTNESSD LOG MACROS
// INFO IS GATED BY A PROCESS-WIDE VERBOSITY FLAG, WARN/ERR ALWAYS PRINT.
// TIMESTAMPS ARE CLOCK_MONOTONIC SECONDS, SHARED WITH THE WRITE LOG.

use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn uptime_secs() -> f64 {
    crate::writelog::now_ns() as f64 / 1_000_000_000.0
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if $crate::logger::verbose() {
            eprintln!("[INFO {:>12.3}] {}", $crate::logger::uptime_secs(),
                      format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        eprintln!("[WARN {:>12.3}] {}", $crate::logger::uptime_secs(),
                  format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        eprintln!("[ERR  {:>12.3}] {}", $crate::logger::uptime_secs(),
                  format_args!($($arg)*))
    };
}

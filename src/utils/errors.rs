//! User-facing diagnostics for the command line. Library code reports through
//! `tracing` instead.

use crate::color::{self, MaybePaint};

pub const DEFAULT_EXIT_CODE: i32 = 1;

pub(crate) fn fmt_error(text: &str) -> String {
    format!(
        "{} {}",
        color::ERROR_INDICATOR.maybe_paint("error:"),
        color::ERROR_TEXT.maybe_paint(text)
    )
}

pub(crate) fn fmt_warn(text: &str) -> String {
    format!(
        "{} {}",
        color::WARNING_INDICATOR.maybe_paint("warning:"),
        color::WARNING_TEXT.maybe_paint(text)
    )
}

pub(crate) fn error_internal(text: &str) {
    eprintln!("{}", fmt_error(text));
}

pub(crate) fn warn_internal(text: &str) {
    eprintln!("{}", fmt_warn(text));
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::warn_internal(&formatted);
    })
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
    })
}

#[macro_export]
macro_rules! die {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
        ::std::process::exit($crate::utils::errors::DEFAULT_EXIT_CODE);
    })
}

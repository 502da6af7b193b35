//! Fatal checks and optional logging.
//!
//! Violated invariants in this crate mean that the collector
//! would otherwise go on to corrupt memory, so they are never recovered from.

/// Check a condition in every build profile, and panic if it does not hold.
macro_rules! check
{
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            gc_error!(condition = stringify!($cond), $($msg)+);
            panic!(
                "check failed: {}: {}",
                stringify!($cond),
                format_args!($($msg)+),
            );
        }
    };
}

/// Like [`check`], but only in builds with debug assertions.
macro_rules! debug_check
{
    ($cond:expr, $($msg:tt)+) => {
        if cfg!(debug_assertions) {
            check!($cond, $($msg)+);
        }
    };
}

#[cfg(feature = "gc_logging")]
macro_rules! gc_trace { ($($arg:tt)*) => { ::tracing::trace!($($arg)*) }; }

#[cfg(feature = "gc_logging")]
macro_rules! gc_debug { ($($arg:tt)*) => { ::tracing::debug!($($arg)*) }; }

#[cfg(feature = "gc_logging")]
macro_rules! gc_error { ($($arg:tt)*) => { ::tracing::error!($($arg)*) }; }

#[cfg(not(feature = "gc_logging"))]
macro_rules! gc_trace { ($($arg:tt)*) => { }; }

#[cfg(not(feature = "gc_logging"))]
macro_rules! gc_debug { ($($arg:tt)*) => { }; }

#[cfg(not(feature = "gc_logging"))]
macro_rules! gc_error { ($($arg:tt)*) => { }; }

#[cfg(test)]
mod tests
{
    #[test]
    fn check_passes()
    {
        check!(1 + 1 == 2, "arithmetic works");
        debug_check!(true, "always true");
    }

    #[test]
    #[should_panic(expected = "check failed: 1 + 1 == 3: off by 1")]
    fn check_fails()
    {
        check!(1 + 1 == 3, "off by {}", 1);
    }
}

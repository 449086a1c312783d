/// Log at trace level under the `bal` target.
#[macro_export]
macro_rules! dev_trace {
    ($($arg:tt)*) => {
        #[cfg(any(feature = "dev", test))]
        {
            $crate::tracing::trace!(target: "bal", $($arg)*);
        }
    };
}

/// Log at debug level under the `bal` target.
#[macro_export]
macro_rules! dev_debug {
    ($($arg:tt)*) => {
        #[cfg(any(feature = "dev", test))]
        {
            $crate::tracing::debug!(target: "bal", $($arg)*);
        }
    };
}

/// Log at info level under the `bal` target.
#[macro_export]
macro_rules! dev_info {
    ($($arg:tt)*) => {
        #[cfg(any(feature = "dev", test))]
        {
            $crate::tracing::info!(target: "bal", $($arg)*);
        }
    };
}

/// Log at warn level under the `bal` target.
#[macro_export]
macro_rules! dev_warn {
    ($($arg:tt)*) => {
        #[cfg(any(feature = "dev", test))]
        {
            $crate::tracing::warn!(target: "bal", $($arg)*);
        }
    };
}

/// Log at error level under the `bal` target.
///
/// Every block-invalidating condition goes through this macro right before the
/// error is returned, so a `dev` build shows why a block was rejected.
#[macro_export]
macro_rules! dev_error {
    ($($arg:tt)*) => {
        #[cfg(any(feature = "dev", test))]
        {
            $crate::tracing::error!(target: "bal", $($arg)*);
        }
    };
}

/// Evaluate an expression and log how long it took at debug level.
///
/// The label names the measured step in the log line. Without the `dev`
/// feature the expression is evaluated as is and nothing is timed.
#[macro_export]
macro_rules! measure_duration {
    ($label:expr, $e:expr) => {{
        #[cfg(any(feature = "dev", test))]
        let __measure_duration_start = std::time::Instant::now();

        #[allow(clippy::let_and_return)]
        let __measure_duration_result = $e;

        #[cfg(any(feature = "dev", test))]
        $crate::tracing::debug!(
            target: "bal",
            "{} took {:?}",
            $label,
            __measure_duration_start.elapsed(),
        );

        __measure_duration_result
    }};
}

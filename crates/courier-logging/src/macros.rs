//! ---
//! courier_section: "03-logging"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Structured logging adapters and sinks."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---

#[doc(hidden)]
#[macro_export]
macro_rules! __courier_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            destination = ctx.destination.unwrap_or(""),
            channel = ctx.channel.unwrap_or(""),
            binding = ctx.binding.unwrap_or_default(),
            epoch = ctx.epoch.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with bridge context.
#[macro_export]
macro_rules! courier_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__courier_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__courier_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with bridge context.
#[macro_export]
macro_rules! courier_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__courier_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__courier_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with bridge context.
#[macro_export]
macro_rules! courier_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__courier_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__courier_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with bridge context.
#[macro_export]
macro_rules! courier_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__courier_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__courier_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}

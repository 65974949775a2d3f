/// Log through a [`Logger`](crate::Logger) with the call site's file, line
/// and enclosing function.
///
/// ```ignore
/// logmill_pipeline::log!(logger, Level::Info, &ctx, "request", "served"; "status" => 200);
/// ```
///
/// Extra pairs after `;` are `key => value`, where the value is anything
/// serializable. A value that fails to serialize is reported by the writer
/// and the event is discarded.
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $ctx:expr, $tag:expr, $msg:expr $(; $($key:expr => $value:expr),+ $(,)?)?) => {
        $logger.log_at(
            $crate::__core::source_location!(),
            $level,
            $ctx,
            $tag,
            $msg,
            $crate::__core::Fields::new()$($(.with($key, &$value))+)?,
        )
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::__core::Level::Debug, $($rest)+)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::__core::Level::Info, $($rest)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::__core::Level::Warn, $($rest)+)
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::__core::Level::Error, $($rest)+)
    };
}

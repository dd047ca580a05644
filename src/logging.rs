//! Helper macros enforcing consistent graph pipeline log fields.
//!
//! These macros keep `appender` (and optionally `namespace`) fields present on every log
//! emitted from the appender pipeline so downstream parsing can rely on them.

/// Log an event for an appender/namespace pair plus any extra fields.
#[macro_export]
macro_rules! appender_event {
    ($level:ident, $event:expr, appender = $appender:expr, namespace = $namespace:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            event = $event,
            appender = %$appender,
            namespace = %$namespace,
            $($field = %$value,)*
        )
    };
    ($level:ident, $event:expr, appender = $appender:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            event = $event,
            appender = %$appender,
            $($field = %$value,)*
        )
    };
}

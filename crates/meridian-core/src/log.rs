//! Logging is an external collaborator (`spec.md` §1 Non-goals): this module
//! states the interface the rest of the crate logs through and ships one
//! default implementation. Formatting, rotation and sinks are the caller's
//! concern.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One emitted log line. Borrowed rather than owned since handlers are
/// expected to consume it synchronously (format, forward, return).
pub struct LogRecord<'a> {
    pub severity: LogSeverity,
    pub target: &'a str,
    pub message: fmt::Arguments<'a>,
}

/// The stated external logging interface. Implementations must not be
/// `Clone`: the design notes call out the source's `FileLogHandler` copy
/// constructor shallow-copying a file descriptor and double-closing it on
/// drop. Forbidding `Clone` here (move-only handles, share via `Arc` if
/// fan-out is needed) structurally rules that bug out.
pub trait LogHandler: Send + Sync {
    fn log(&self, record: LogRecord<'_>);
}

/// Default handler, forwarding to `tracing`'s global dispatcher.
#[derive(Debug, Default)]
pub struct TracingLogHandler;

impl LogHandler for TracingLogHandler {
    fn log(&self, record: LogRecord<'_>) {
        match record.severity {
            LogSeverity::Trace => tracing::trace!(target: "meridian", message = %record.message),
            LogSeverity::Debug => tracing::debug!(target: "meridian", message = %record.message),
            LogSeverity::Info => tracing::info!(target: "meridian", message = %record.message),
            LogSeverity::Warn => tracing::warn!(target: "meridian", message = %record.message),
            LogSeverity::Error => tracing::error!(target: "meridian", message = %record.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_handler_does_not_panic_on_any_severity() {
        let handler = TracingLogHandler;
        for severity in [
            LogSeverity::Trace,
            LogSeverity::Debug,
            LogSeverity::Info,
            LogSeverity::Warn,
            LogSeverity::Error,
        ] {
            handler.log(LogRecord {
                severity,
                target: "test",
                message: format_args!("hello"),
            });
        }
    }
}

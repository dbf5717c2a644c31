//! Maps `std::io::Error` and TLS failures onto [`CoreError`], the only error
//! type `meridian-core` understands.

use std::io;

use meridian_core::error::{codes, CoreError, Error, ErrorCategory};

/// A tiny `Error` wrapper so a raw `std::io::Error` can ride along as a
/// [`CoreError`] cause without `meridian-core` depending on `std::io`.
#[derive(Debug)]
struct IoCause(io::Error);

impl std::fmt::Display for IoCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for IoCause {}

pub(crate) fn map_io_error(code: &'static str, err: io::Error) -> CoreError {
    let category = match err.kind() {
        io::ErrorKind::TimedOut => ErrorCategory::Retryable,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    };
    CoreError::new(code, err.to_string())
        .with_cause(IoCause(err))
        .with_category(category)
}

pub(crate) fn map_connect_error(err: io::Error) -> CoreError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => map_io_error(codes::CONNECTION_REFUSED, err),
        io::ErrorKind::TimedOut => map_io_error(codes::TIMED_OUT, err),
        _ => map_io_error(codes::CONNECTION_REFUSED, err),
    }
}

pub(crate) fn map_tls_error(err: impl std::error::Error) -> CoreError {
    CoreError::new(codes::HANDSHAKE_FAILED, err.to_string()).with_category(ErrorCategory::NonRetryable)
}

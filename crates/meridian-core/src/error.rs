//! Stable error envelope shared across every layer of the runtime.
//!
//! Resolvers, connectors and the dispatcher never panic on caller-facing
//! failure paths; they surface a [`CoreError`] instead, tagged with one of
//! the symbolic codes in [`codes`] and an [`ErrorCategory`] the connector
//! and dispatcher use to decide whether a socket stays open.

use std::borrow::Cow;
use std::fmt;

/// Object-safe error supertrait every public error type in this crate
/// implements. Kept independent of `std::error::Error` so the error domain
/// can be threaded through trait objects without extra bounds.
pub trait Error: fmt::Debug + fmt::Display + Send + Sync {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref()
    }
}

/// Stable symbolic error codes, matching the §6 error code surface.
pub mod codes {
    pub const SUCCESS: &str = "meridian.success";
    pub const BAD_ADDRESS: &str = "meridian.bad_address";
    pub const HOST_NOT_FOUND: &str = "meridian.host_not_found";
    pub const CONNECTION_REFUSED: &str = "meridian.connection_refused";
    pub const TIMED_OUT: &str = "meridian.timed_out";
    pub const CANCELLED: &str = "meridian.cancelled";
    pub const DISCONNECTED: &str = "meridian.disconnected";
    pub const HANDSHAKE_FAILED: &str = "meridian.handshake_failed";
    pub const PROTOCOL_ERROR: &str = "meridian.protocol_error";
    pub const NOT_FOUND: &str = "meridian.not_found";
    pub const CONVERSION_FAILED: &str = "meridian.conversion_failed";
    pub const OVERFLOW: &str = "meridian.overflow";
    pub const INTERNAL: &str = "meridian.internal";
}

/// How a failure should be treated by automated retry/backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient; the same operation may succeed if retried.
    Retryable,
    /// Will not succeed without a caller-visible change (bad input, unknown method, ...).
    NonRetryable,
    /// An invariant was broken; in debug builds this should have aborted instead.
    Fatal,
}

/// The runtime's single error envelope: a stable code, a message, an
/// optional cause chain and a retry category.
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<Box<dyn Error + 'static>>,
    category: ErrorCategory,
}

impl CoreError {
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            category: ErrorCategory::NonRetryable,
        }
    }

    pub fn with_cause(mut self, cause: impl Error + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Construct the `Cancelled` error used throughout §5's cooperative
    /// cancellation paths.
    pub fn cancelled() -> Self {
        Self::new(codes::CANCELLED, "operation was cancelled")
            .with_category(ErrorCategory::NonRetryable)
    }

    /// Construct the `BadAddress` error §4.F / §6 require for malformed URLs.
    pub fn bad_address(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::BAD_ADDRESS, reason).with_category(ErrorCategory::NonRetryable)
    }

    /// An internal-invariant failure. Debug builds abort (per §7); release
    /// builds downgrade to a `ProtocolError` and log at error level.
    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        let message = message.into();
        tracing::error!(target: "meridian_core::internal", %message, "internal invariant broken");
        if cfg!(debug_assertions) {
            panic!("meridian internal invariant broken: {message}");
        }
        Self::new(codes::PROTOCOL_ERROR, message).with_category(ErrorCategory::Fatal)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): ", self.message, self.code)?;
        match &self.cause {
            Some(cause) => write!(f, "caused by: {cause}"),
            None => write!(f, "<no cause>"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_error_has_no_cause_and_default_category() {
        let err = CoreError::new(codes::NOT_FOUND, "no such method");
        assert_eq!(err.code(), codes::NOT_FOUND);
        assert_eq!(err.message(), "no such method");
        assert_eq!(err.category(), ErrorCategory::NonRetryable);
    }

    #[test]
    fn with_cause_is_visible_through_error_source() {
        let inner = CoreError::new(codes::TIMED_OUT, "dns lookup timed out");
        let outer = CoreError::new(codes::CONNECTION_REFUSED, "connect failed").with_cause(inner);
        assert!(Error::source(&outer).is_some());
    }
}

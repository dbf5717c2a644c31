//! Dynamic type/value system and service-RPC substrate for the Meridian
//! messaging runtime: reflection, cross-kind conversion, the meta-object
//! model, generic function dispatch, name resolution, connection setup and
//! wire framing. The crate never names a concrete transport or async
//! runtime; `meridian-tcp` supplies both.

pub mod config;
pub mod error;
pub mod log;
pub mod meta;
pub mod net;
pub mod transport;
pub mod types;

pub use config::{AsyncExecutor, BoxFuture, Config, ConfigBuilder, IpV6Policy, SslPolicy, TlsContext};
pub use error::{codes, CoreError, Error, ErrorCategory};
pub use log::{LogHandler, LogRecord, LogSeverity, TracingLogHandler};

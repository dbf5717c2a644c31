//! Configuration: the set of collaborators a session needs injected from
//! outside the core (`spec.md` §6 Configuration, §5 "the runtime itself
//! spawns no threads").

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::log::{LogHandler, LogSeverity, TracingLogHandler};
use crate::net::url::Url;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The externally-supplied I/O executor (`spec.md` §5, §1 Non-goals: "does
/// not define its own threading policy toward callers"). `meridian-tcp`
/// ships a `tokio`-backed implementation; tests use an inline executor that
/// runs futures to completion on the calling task.
pub trait AsyncExecutor: Send + Sync {
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpV6Policy {
    Enabled,
    Disabled,
}

impl IpV6Policy {
    pub fn allowed(self) -> bool {
        matches!(self, IpV6Policy::Enabled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SslPolicy {
    Enabled,
    Disabled,
}

impl SslPolicy {
    pub fn enabled(self) -> bool {
        matches!(self, SslPolicy::Enabled)
    }
}

/// Opaque carrier for a TLS client context. `meridian-core` never names a
/// TLS library directly; `meridian-tcp` downcasts via [`std::any::Any`] to
/// recover its concrete `rustls::ClientConfig`.
pub trait TlsContext: Send + Sync + std::any::Any {
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Assembled runtime configuration for a session.
pub struct Config {
    executor: Arc<dyn AsyncExecutor>,
    tls_context: Option<Arc<dyn TlsContext>>,
    directory_url: Url,
    ipv6_policy: IpV6Policy,
    ssl_policy: SslPolicy,
    verbosity: LogSeverity,
    log_handler: Arc<dyn LogHandler>,
}

impl Config {
    pub fn builder(executor: Arc<dyn AsyncExecutor>, directory_url: Url) -> ConfigBuilder {
        ConfigBuilder {
            executor,
            tls_context: None,
            directory_url,
            ipv6_policy: IpV6Policy::Disabled,
            ssl_policy: SslPolicy::Disabled,
            verbosity: LogSeverity::Info,
            log_handler: Arc::new(TracingLogHandler),
        }
    }

    pub fn executor(&self) -> &Arc<dyn AsyncExecutor> {
        &self.executor
    }

    pub fn tls_context(&self) -> Option<&Arc<dyn TlsContext>> {
        self.tls_context.as_ref()
    }

    pub fn directory_url(&self) -> &Url {
        &self.directory_url
    }

    pub fn ipv6_policy(&self) -> IpV6Policy {
        self.ipv6_policy
    }

    pub fn ssl_policy(&self) -> SslPolicy {
        self.ssl_policy
    }

    pub fn verbosity(&self) -> LogSeverity {
        self.verbosity
    }

    pub fn log_handler(&self) -> &Arc<dyn LogHandler> {
        &self.log_handler
    }
}

pub struct ConfigBuilder {
    executor: Arc<dyn AsyncExecutor>,
    tls_context: Option<Arc<dyn TlsContext>>,
    directory_url: Url,
    ipv6_policy: IpV6Policy,
    ssl_policy: SslPolicy,
    verbosity: LogSeverity,
    log_handler: Arc<dyn LogHandler>,
}

impl ConfigBuilder {
    pub fn tls_context(mut self, context: Arc<dyn TlsContext>) -> Self {
        self.tls_context = Some(context);
        self
    }

    pub fn ipv6_policy(mut self, policy: IpV6Policy) -> Self {
        self.ipv6_policy = policy;
        self
    }

    pub fn ssl_policy(mut self, policy: SslPolicy) -> Self {
        self.ssl_policy = policy;
        self
    }

    pub fn verbosity(mut self, verbosity: LogSeverity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn log_handler(mut self, handler: Arc<dyn LogHandler>) -> Self {
        self.log_handler = handler;
        self
    }

    pub fn build(self) -> Config {
        Config {
            executor: self.executor,
            tls_context: self.tls_context,
            directory_url: self.directory_url,
            ipv6_policy: self.ipv6_policy,
            ssl_policy: self.ssl_policy,
            verbosity: self.verbosity,
            log_handler: self.log_handler,
        }
    }
}

//! Connector (`spec.md` §4.G, §9 "Coroutine-style control flow"): sequences
//! resolve -> connect -> optional TLS handshake -> deliver socket as an
//! explicit state machine with cancellation reachable from any non-terminal
//! state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::channel::Channel;
use super::resolve::{resolve_url_list, ResolveEntry, Resolver};
use crate::config::{IpV6Policy, TlsContext};
use crate::error::{codes, CoreError};

/// Which side of the handshake this peer plays; only meaningful when
/// `use_ssl` is set (`spec.md` §4.G).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeSide {
    Client,
    Server,
}

/// The connector's explicit state machine (`spec.md` §9). `Cancelled` is
/// reachable from every non-terminal state; `Ready` and `Cancelled` are the
/// only terminal states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectorState {
    Resolving,
    Connecting,
    Handshaking,
    Ready,
    Cancelled,
}

impl ConnectorState {
    fn is_terminal(self) -> bool {
        matches!(self, ConnectorState::Ready | ConnectorState::Cancelled)
    }
}

/// Opens a transport-level socket to one resolved entry. `meridian-tcp`
/// implements this over `tokio::net::TcpStream::connect`.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, entry: &ResolveEntry, port: u16) -> Result<Channel, CoreError>;
}

/// Performs the TLS handshake over an already-connected [`Channel`].
#[async_trait]
pub trait TlsHandshake: Send + Sync {
    async fn handshake(&self, socket: Channel, tls_context: &Arc<dyn TlsContext>, side: HandshakeSide) -> Result<Channel, CoreError>;
}

/// Cooperative cancellation flag shared between a caller and an in-flight
/// connector attempt (`spec.md` §5: "resolvers and connectors check
/// cancellation at suspension points").
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct ConnectParams<'a> {
    pub raw_url: &'a str,
    pub use_ssl: bool,
    pub tls_context: Option<Arc<dyn TlsContext>>,
    pub ipv6_policy: IpV6Policy,
    pub handshake_side: HandshakeSide,
}

/// One connection attempt. Exposes its current [`ConnectorState`] so callers
/// (and tests) can observe the sequence `Resolving -> Connecting ->
/// Handshaking -> Ready`, matching the design notes' "single continuation
/// slot per state".
pub struct Connector {
    state: Mutex<ConnectorState>,
    cancel: CancellationToken,
}

impl Connector {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            state: Mutex::new(ConnectorState::Resolving),
            cancel,
        }
    }

    pub fn state(&self) -> ConnectorState {
        *self.state.lock()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn transition(&self, next: ConnectorState) {
        let mut state = self.state.lock();
        debug!(target: "meridian_core::connector", from = ?*state, to = ?next, "connector state transition");
        *state = next;
    }

    fn check_cancelled(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            self.transition(ConnectorState::Cancelled);
            return Err(CoreError::cancelled());
        }
        Ok(())
    }

    /// Runs the full pipeline once; invoked at most once per attempt, like
    /// the source's one-shot callback (`spec.md` §4.G: "Invoke `cb(error,
    /// socket)` exactly once").
    pub async fn connect(
        &self,
        resolver: &dyn Resolver,
        socket_connector: &dyn SocketConnector,
        tls: Option<&dyn TlsHandshake>,
        params: ConnectParams<'_>,
    ) -> Result<Channel, CoreError> {
        if self.state().is_terminal() {
            return Err(CoreError::new(codes::PROTOCOL_ERROR, "connector attempt already completed"));
        }

        self.check_cancelled()?;
        let (url, entries) = resolve_url_list(resolver, params.raw_url).await?;
        let admissible = admissible_entries_in_preference_order(&entries, params.ipv6_policy.allowed());
        if admissible.is_empty() {
            self.transition(ConnectorState::Cancelled);
            return Err(CoreError::bad_address("no admissible resolved entry for this ipv6 policy"));
        }

        self.transition(ConnectorState::Connecting);
        self.check_cancelled()?;
        let mut last_error = None;
        let mut socket = None;
        for entry in &admissible {
            match socket_connector.connect(entry, url.port()).await {
                Ok(channel) => {
                    socket = Some(channel);
                    break;
                }
                Err(error) => {
                    warn!(target: "meridian_core::connector", address = %entry.address, %error, "connect attempt failed, trying next entry");
                    last_error = Some(error);
                }
            }
        }
        let mut socket = match socket {
            Some(socket) => socket,
            None => {
                self.transition(ConnectorState::Cancelled);
                return Err(last_error.unwrap_or_else(|| CoreError::new(codes::CONNECTION_REFUSED, "no resolved entry accepted a connection")));
            }
        };

        if params.use_ssl {
            self.transition(ConnectorState::Handshaking);
            self.check_cancelled()?;
            let handshake = tls.ok_or_else(|| CoreError::new(codes::HANDSHAKE_FAILED, "ssl requested but no handshake implementation was supplied"))?;
            let tls_context = params
                .tls_context
                .as_ref()
                .ok_or_else(|| CoreError::new(codes::HANDSHAKE_FAILED, "ssl requested but no tls context was supplied"))?;
            socket = handshake.handshake(socket, tls_context, params.handshake_side).await?;
        }

        self.transition(ConnectorState::Ready);
        Ok(socket)
    }
}

/// Orders resolved entries the way the connector should try them: every
/// IPv4 entry first, then (only if the policy allows) every IPv6 entry,
/// each group preserving resolver order.
fn admissible_entries_in_preference_order(entries: &[ResolveEntry], ipv6_allowed: bool) -> Vec<ResolveEntry> {
    let mut ordered: Vec<ResolveEntry> = entries.iter().filter(|e| !e.is_ipv6).cloned().collect();
    if ipv6_allowed {
        ordered.extend(entries.iter().filter(|e| e.is_ipv6).cloned());
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::channel::{ChannelReader, ChannelWriter};
    use crate::net::resolve::MockResolver;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeReader;
    #[async_trait]
    impl ChannelReader for FakeReader {
        async fn read(&mut self, _buf: &mut [u8]) -> Result<usize, CoreError> {
            Ok(0)
        }
        fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
            self
        }
    }

    struct FakeWriter;
    #[async_trait]
    impl ChannelWriter for FakeWriter {
        async fn write_all(&mut self, _buf: &[u8]) -> Result<(), CoreError> {
            Ok(())
        }
        async fn shutdown(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
        fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
            self
        }
    }

    fn fake_channel() -> Channel {
        Channel::new(Box::new(FakeReader), Box::new(FakeWriter))
    }

    struct AlwaysSucceeds;
    #[async_trait]
    impl SocketConnector for AlwaysSucceeds {
        async fn connect(&self, _entry: &ResolveEntry, _port: u16) -> Result<Channel, CoreError> {
            Ok(fake_channel())
        }
    }

    struct FailsThenSucceeds {
        calls: AsyncMutex<u32>,
    }
    #[async_trait]
    impl SocketConnector for FailsThenSucceeds {
        async fn connect(&self, _entry: &ResolveEntry, _port: u16) -> Result<Channel, CoreError> {
            let mut calls = self.calls.lock().await;
            *calls += 1;
            if *calls == 1 {
                Err(CoreError::new(codes::CONNECTION_REFUSED, "first entry refused"))
            } else {
                Ok(fake_channel())
            }
        }
    }

    #[tokio::test]
    async fn happy_path_reaches_ready_without_ssl() {
        let resolver = MockResolver::new().with_entries("host", vec![ResolveEntry::new("10.0.0.1", false)]);
        let connector = Connector::new(CancellationToken::new());
        let params = ConnectParams {
            raw_url: "tcp://host:1234",
            use_ssl: false,
            tls_context: None,
            ipv6_policy: IpV6Policy::Disabled,
            handshake_side: HandshakeSide::Client,
        };
        let result = connector.connect(&resolver, &AlwaysSucceeds, None, params).await;
        assert!(result.is_ok());
        assert_eq!(connector.state(), ConnectorState::Ready);
    }

    #[tokio::test]
    async fn connecting_falls_through_to_next_entry_on_failure() {
        let resolver = MockResolver::new().with_entries(
            "host",
            vec![ResolveEntry::new("10.0.0.1", false), ResolveEntry::new("10.0.0.2", false)],
        );
        let connector = Connector::new(CancellationToken::new());
        let connector_impl = FailsThenSucceeds { calls: AsyncMutex::new(0) };
        let params = ConnectParams {
            raw_url: "tcp://host:1234",
            use_ssl: false,
            tls_context: None,
            ipv6_policy: IpV6Policy::Disabled,
            handshake_side: HandshakeSide::Client,
        };
        let result = connector.connect(&resolver, &connector_impl, None, params).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancelling_before_connect_yields_cancelled_state() {
        let resolver = MockResolver::new().with_entries("host", vec![ResolveEntry::new("10.0.0.1", false)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let connector = Connector::new(cancel);
        let params = ConnectParams {
            raw_url: "tcp://host:1234",
            use_ssl: false,
            tls_context: None,
            ipv6_policy: IpV6Policy::Disabled,
            handshake_side: HandshakeSide::Client,
        };
        let result = connector.connect(&resolver, &AlwaysSucceeds, None, params).await;
        assert!(result.is_err());
        assert_eq!(connector.state(), ConnectorState::Cancelled);
    }

    #[tokio::test]
    async fn ssl_without_handshake_impl_fails() {
        let resolver = MockResolver::new().with_entries("host", vec![ResolveEntry::new("10.0.0.1", false)]);
        let connector = Connector::new(CancellationToken::new());
        let params = ConnectParams {
            raw_url: "tcps://host:1234",
            use_ssl: true,
            tls_context: None,
            ipv6_policy: IpV6Policy::Disabled,
            handshake_side: HandshakeSide::Client,
        };
        let result = connector.connect(&resolver, &AlwaysSucceeds, None, params).await;
        assert!(result.is_err());
    }
}

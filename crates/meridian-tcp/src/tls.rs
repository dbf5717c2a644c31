//! TLS channel halves and the [`TlsHandshake`] implementation, grounded on
//! `tokio_rustls` (`spec.md` §4.G "optional TLS handshake").
//!
//! `tokio_rustls`'s stream types don't offer `into_split` the way
//! `TcpStream` does, so both halves here wrap `tokio::io::{ReadHalf,
//! WriteHalf}` from `tokio::io::split`, which works over any
//! `AsyncRead + AsyncWrite` type by serializing access to the shared stream
//! rather than owning disjoint halves of the kernel socket.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use meridian_core::config::TlsContext;
use meridian_core::error::{codes, CoreError};
use meridian_core::net::{Channel, ChannelReader, ChannelWriter, HandshakeSide, TlsHandshake};

use crate::error::map_tls_error;
use crate::tcp::reunite;

/// Opaque client-side TLS material: the `rustls::ClientConfig` plus the SNI
/// name to present, recovered through [`TlsContext::as_any`] by
/// [`RustlsHandshake`].
pub struct RustlsClientContext {
    pub config: Arc<rustls::ClientConfig>,
    pub server_name: ServerName<'static>,
}

impl TlsContext for RustlsClientContext {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Opaque server-side TLS material.
pub struct RustlsServerContext {
    pub config: Arc<rustls::ServerConfig>,
}

impl TlsContext for RustlsServerContext {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct TlsReadHalf<S>(ReadHalf<S>);

#[async_trait]
impl<S: tokio::io::AsyncRead + Send + Unpin + 'static> ChannelReader for TlsReadHalf<S> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
        self.0.read(buf).await.map_err(|err| CoreError::new(codes::DISCONNECTED, err.to_string()))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct TlsWriteHalf<S>(WriteHalf<S>);

#[async_trait]
impl<S: tokio::io::AsyncWrite + Send + Unpin + 'static> ChannelWriter for TlsWriteHalf<S> {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), CoreError> {
        AsyncWriteExt::write_all(&mut self.0, buf)
            .await
            .map_err(|err| CoreError::new(codes::DISCONNECTED, err.to_string()))
    }

    async fn shutdown(&mut self) -> Result<(), CoreError> {
        AsyncWriteExt::shutdown(&mut self.0)
            .await
            .map_err(|err| CoreError::new(codes::DISCONNECTED, err.to_string()))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Performs the TLS handshake over a reunited plain-TCP stream, then
/// re-splits the resulting `TlsStream` back into a `Channel`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RustlsHandshake;

impl RustlsHandshake {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TlsHandshake for RustlsHandshake {
    async fn handshake(&self, socket: Channel, tls_context: &Arc<dyn TlsContext>, side: HandshakeSide) -> Result<Channel, CoreError> {
        let stream: TcpStream = reunite(socket)?;

        match side {
            HandshakeSide::Client => {
                let context = tls_context
                    .as_any()
                    .downcast_ref::<RustlsClientContext>()
                    .ok_or_else(|| CoreError::new(codes::HANDSHAKE_FAILED, "client handshake requires a RustlsClientContext"))?;
                let connector = TlsConnector::from(context.config.clone());
                let tls_stream = connector
                    .connect(context.server_name.clone(), stream)
                    .await
                    .map_err(|err| map_tls_error(err))?;
                let (read_half, write_half) = tokio::io::split(tls_stream);
                Ok(Channel::new(Box::new(TlsReadHalf(read_half)), Box::new(TlsWriteHalf(write_half))))
            }
            HandshakeSide::Server => {
                let context = tls_context
                    .as_any()
                    .downcast_ref::<RustlsServerContext>()
                    .ok_or_else(|| CoreError::new(codes::HANDSHAKE_FAILED, "server handshake requires a RustlsServerContext"))?;
                let acceptor = TlsAcceptor::from(context.config.clone());
                let tls_stream = acceptor.accept(stream).await.map_err(|err| map_tls_error(err))?;
                let (read_half, write_half) = tokio::io::split(tls_stream);
                Ok(Channel::new(Box::new(TlsReadHalf(read_half)), Box::new(TlsWriteHalf(write_half))))
            }
        }
    }
}

//! Plain-TCP [`Channel`] halves and the [`SocketConnector`]/listener that
//! produce them, grounded on `tokio::net::TcpStream::into_split` (`spec.md`
//! §4.G, §3 SocketHandle).

use std::any::Any;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};

use meridian_core::error::CoreError;
use meridian_core::net::{Channel, ChannelReader, ChannelWriter, ResolveEntry, SocketConnector};

use crate::error::{map_connect_error, map_io_error};

/// The read half of a split `TcpStream`.
pub struct TcpReadHalf(pub(crate) OwnedReadHalf);

#[async_trait]
impl ChannelReader for TcpReadHalf {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
        self.0.read(buf).await.map_err(|err| map_io_error(meridian_core::error::codes::DISCONNECTED, err))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// The write half of a split `TcpStream`.
pub struct TcpWriteHalf(pub(crate) OwnedWriteHalf);

#[async_trait]
impl ChannelWriter for TcpWriteHalf {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), CoreError> {
        AsyncWriteExt::write_all(&mut self.0, buf)
            .await
            .map_err(|err| map_io_error(meridian_core::error::codes::DISCONNECTED, err))
    }

    async fn shutdown(&mut self) -> Result<(), CoreError> {
        AsyncWriteExt::shutdown(&mut self.0)
            .await
            .map_err(|err| map_io_error(meridian_core::error::codes::DISCONNECTED, err))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Reunites a plain-TCP `Channel`'s halves back into one `TcpStream`. Only
/// the TLS handshake needs this; everything else talks to the halves through
/// `ChannelReader`/`ChannelWriter` alone.
pub(crate) fn reunite(channel: Channel) -> Result<TcpStream, CoreError> {
    let read_half = channel
        .reader
        .into_any()
        .downcast::<TcpReadHalf>()
        .map_err(|_| CoreError::new(meridian_core::error::codes::HANDSHAKE_FAILED, "tls handshake requires a plain tcp channel"))?;
    let write_half = channel
        .writer
        .into_any()
        .downcast::<TcpWriteHalf>()
        .map_err(|_| CoreError::new(meridian_core::error::codes::HANDSHAKE_FAILED, "tls handshake requires a plain tcp channel"))?;
    read_half
        .0
        .reunite(write_half.0)
        .map_err(|_| CoreError::internal("tcp read/write halves did not originate from the same stream"))
}

fn split_channel(stream: TcpStream) -> Channel {
    let (read_half, write_half) = stream.into_split();
    Channel::new(Box::new(TcpReadHalf(read_half)), Box::new(TcpWriteHalf(write_half)))
}

/// Dials one resolved entry over plain TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpSocketConnector;

impl TcpSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketConnector for TcpSocketConnector {
    async fn connect(&self, entry: &ResolveEntry, port: u16) -> Result<Channel, CoreError> {
        let target = if entry.is_ipv6 {
            format!("[{}]:{}", entry.address, port)
        } else {
            format!("{}:{}", entry.address, port)
        };
        let stream = TcpStream::connect(&target).await.map_err(map_connect_error)?;
        stream.set_nodelay(true).map_err(|err| map_io_error(meridian_core::error::codes::INTERNAL, err))?;
        Ok(split_channel(stream))
    }
}

/// Accepts inbound plain-TCP connections.
pub struct TcpListener {
    inner: TokioTcpListener,
}

impl TcpListener {
    pub async fn bind(addr: &str) -> Result<Self, CoreError> {
        let inner = TokioTcpListener::bind(addr).await.map_err(|err| map_io_error(meridian_core::error::codes::INTERNAL, err))?;
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, CoreError> {
        self.inner.local_addr().map_err(|err| map_io_error(meridian_core::error::codes::INTERNAL, err))
    }

    /// Accepts one inbound connection, returning its already-split `Channel`
    /// and the peer's address.
    pub async fn accept(&self) -> Result<(Channel, std::net::SocketAddr), CoreError> {
        let (stream, peer) = self.inner.accept().await.map_err(|err| map_io_error(meridian_core::error::codes::INTERNAL, err))?;
        stream.set_nodelay(true).map_err(|err| map_io_error(meridian_core::error::codes::INTERNAL, err))?;
        Ok((split_channel(stream), peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::net::ResolveEntry;

    #[tokio::test]
    async fn connector_and_listener_exchange_bytes_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accepted = tokio::spawn(async move { listener.accept().await.unwrap() });

        let connector = TcpSocketConnector::new();
        let client = connector.connect(&ResolveEntry::new("127.0.0.1", false), port).await.unwrap();

        let (server, _peer) = accepted.await.unwrap();

        let mut client_writer = client.writer;
        client_writer.write_all(b"ping").await.unwrap();

        let mut server_reader = server.reader;
        let mut buf = [0u8; 4];
        let mut read = 0;
        while read < buf.len() {
            read += server_reader.read(&mut buf[read..]).await.unwrap();
        }
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn reunite_recovers_the_original_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = tokio::spawn(async move { listener.accept().await.unwrap() });

        let connector = TcpSocketConnector::new();
        let client = connector.connect(&ResolveEntry::new("127.0.0.1", false), port).await.unwrap();
        accepted.await.unwrap();

        assert!(reunite(client).is_ok());
    }
}

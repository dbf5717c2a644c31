//! The byte-stream abstraction the connector hands off and the framer reads
//! from. `meridian-core` never names a concrete transport; `meridian-tcp`
//! implements these over `tokio::net::TcpStream` and `tokio_rustls::TlsStream`,
//! splitting each into owned read/write halves the way `TcpStream::into_split`
//! does so a socket's read loop and its outbound writes never contend for one
//! lock (`spec.md` §3 SocketHandle, §5 "non-blocking, cooperative I/O").

use async_trait::async_trait;

use crate::error::CoreError;

/// The read half of a connected byte stream.
#[async_trait]
pub trait ChannelReader: Send {
    /// Reads at least one byte into `buf`, returning the number read, or
    /// `0` at end-of-stream. Mirrors `AsyncRead::read`'s short-read contract.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError>;

    /// Recovers the concrete type behind the box. A TLS handshake needs to
    /// reunite a plain-TCP `Channel`'s halves back into one stream before
    /// wrapping it; this is the downcast that makes that possible without
    /// `meridian-core` naming `TcpStream` itself.
    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any>;
}

/// The write half of a connected byte stream.
#[async_trait]
pub trait ChannelWriter: Send {
    /// Writes the entirety of `buf`, looping internally on short writes.
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), CoreError>;

    /// Half-closes the write side; a best-effort courtesy to the peer.
    async fn shutdown(&mut self) -> Result<(), CoreError>;

    /// See [`ChannelReader::into_any`].
    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any>;
}

/// A connected transport already split into independent halves. Plain TCP
/// and TLS-wrapped TCP both produce one of these the same way from the
/// framer's point of view.
pub struct Channel {
    pub reader: Box<dyn ChannelReader>,
    pub writer: Box<dyn ChannelWriter>,
}

impl Channel {
    pub fn new(reader: Box<dyn ChannelReader>, writer: Box<dyn ChannelWriter>) -> Self {
        Self { reader, writer }
    }
}

/// Current lifecycle state of a [`Channel`]-backed socket (`spec.md` §3
/// SocketHandle).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

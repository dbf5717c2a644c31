//! Concrete `tokio`/`rustls` transport for the Meridian messaging runtime:
//! the `AsyncExecutor`, `Resolver`, `SocketConnector` and `TlsHandshake`
//! implementations `meridian-core` is generic over.

mod error;
mod executor;
mod resolver;
mod tcp;
mod tls;

pub use executor::TokioExecutor;
pub use resolver::TokioResolver;
pub use tcp::{TcpListener, TcpReadHalf, TcpSocketConnector, TcpWriteHalf};
pub use tls::{RustlsClientContext, RustlsHandshake, RustlsServerContext};

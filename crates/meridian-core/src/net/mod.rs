//! URL parsing, name resolution and the connector state machine (`spec.md`
//! §4.F, §4.G).

pub mod channel;
pub mod connector;
pub mod resolve;
pub mod url;

pub use channel::{Channel, ChannelReader, ChannelWriter, SocketState};
pub use connector::{CancellationToken, ConnectParams, Connector, ConnectorState, HandshakeSide, SocketConnector, TlsHandshake};
pub use resolve::{find_first_valid_if_any, resolve_url, resolve_url_list, MockResolver, ResolveEntry, Resolver};
pub use url::{HostForm, Scheme, Url};

//! End-to-end round trip over a real loopback TCP socket: listener accepts,
//! a `Dispatcher` exposes a bound method, and a client `Socket::call` gets
//! back the method's result through actual kernel I/O rather than the
//! in-memory pipe `meridian-core`'s own unit tests use.

use std::sync::Arc;

use meridian_core::meta::generic::wrap1;
use meridian_core::meta::object::{ObjectMeta, ObjectRegistry};
use meridian_core::meta::MetaMethod;
use meridian_core::net::{ResolveEntry, SocketConnector};
use meridian_core::transport::{Dispatcher, Socket};
use meridian_core::types::{TypeDescriptor, Value};
use meridian_tcp::{TcpListener, TcpSocketConnector};

#[tokio::test]
async fn call_round_trips_over_a_real_tcp_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_dispatcher = Arc::new(Dispatcher::new());
    let registry = ObjectRegistry::new();
    let mut meta = ObjectMeta::new("svc");
    meta.add_method(MetaMethod::new(1, "uppercaseLength::(s)i32")).unwrap();
    let record = registry.register(1, meta);
    server_dispatcher.expose(1, 1, record);
    server_dispatcher.bind_method(
        1,
        1,
        1,
        Arc::new(wrap1(|s: String| s.to_uppercase().len() as i32)),
    );

    let accept_task = tokio::spawn(async move {
        let (channel, _peer) = listener.accept().await.unwrap();
        let socket = Arc::new(Socket::new(channel, server_dispatcher));
        socket.pump().await.unwrap();
    });

    let connector = TcpSocketConnector::new();
    let client_channel = connector.connect(&ResolveEntry::new("127.0.0.1", false), port).await.unwrap();
    let client_dispatcher = Arc::new(Dispatcher::new());
    let client_socket = Socket::new(client_channel, client_dispatcher);

    let args = Value::set_string("hello");
    let result = client_socket
        .call(1, 1, 1, &args, &TypeDescriptor::int(true, 32))
        .await
        .unwrap();

    accept_task.await.unwrap();
    assert_eq!(result.to_int().unwrap(), 5);
}

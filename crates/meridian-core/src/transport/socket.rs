//! Frame-level socket driver: reads bytes off a [`Channel`]'s read half,
//! decodes frames, routes them through a [`Dispatcher`], and writes back
//! whatever the dispatcher produces (`spec.md` §4.H, §5 "writes complete in
//! submission order").
//!
//! The read and write halves sit behind independent locks so a long-running
//! [`Socket::pump`] loop waiting on fresh bytes never blocks a concurrent
//! [`Socket::call`] from writing its `Call` frame.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use super::codec::{decode_value, encode_value, kind_wire_tag};
use super::dispatch::Dispatcher;
use super::frame::{Frame, MessageType};
use crate::error::{codes, CoreError};
use crate::net::channel::{Channel, ChannelReader, ChannelWriter, SocketState};
use crate::types::descriptor::TypeDescriptor;
use crate::types::value::Value;

const READ_CHUNK: usize = 4096;

/// Owns one connected [`Channel`] plus the read-side framing state.
/// `pump` is typically driven in a loop on its own task while callers issue
/// `call`/`post`/`cancel` concurrently from others.
pub struct Socket {
    reader: Mutex<Box<dyn ChannelReader>>,
    writer: Mutex<Box<dyn ChannelWriter>>,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<SocketState>,
    read_buf: Mutex<BytesMut>,
}

impl Socket {
    pub fn new(channel: Channel, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            reader: Mutex::new(channel.reader),
            writer: Mutex::new(channel.writer),
            dispatcher,
            state: Mutex::new(SocketState::Connected),
            read_buf: Mutex::new(BytesMut::new()),
        }
    }

    pub fn state(&self) -> SocketState {
        *self.state.lock()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), CoreError> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        self.writer.lock().write_all(&buf).await
    }

    /// Issues a `Call` and awaits its matching `Reply`, decoding the result
    /// against `return_descriptor`. Out-of-order replies are handled
    /// transparently by the dispatcher's `messageId` correlation.
    pub async fn call(
        &self,
        service_id: u32,
        object_id: u32,
        action_id: u32,
        args: &Value,
        return_descriptor: &Arc<TypeDescriptor>,
    ) -> Result<Value, CoreError> {
        let message_id = self.dispatcher.next_message_id();
        let mut payload = BytesMut::new();
        encode_value(args, &mut payload)?;
        let frame = Frame {
            service_id,
            object_id,
            action_id,
            message_id,
            message_type: MessageType::Call,
            payload_type: kind_wire_tag(args.kind()),
            payload: payload.to_vec(),
        };
        let pending = self.dispatcher.register_pending(message_id);
        self.send_frame(&frame).await?;

        let reply = pending
            .await
            .map_err(|_| CoreError::new(codes::DISCONNECTED, "socket closed before a reply arrived"))??;
        let mut reply_payload = BytesMut::from(&reply.payload[..]);
        decode_value(return_descriptor, &mut reply_payload)
    }

    /// Sends a `Cancel` frame for `message_id`. Per §5, the local future is
    /// completed with `Cancelled` immediately by the dispatcher and does not
    /// wait for the peer to acknowledge.
    pub async fn cancel(&self, message_id: u32) -> Result<(), CoreError> {
        self.dispatcher.cancel_pending(message_id);
        let frame = Frame {
            service_id: 0,
            object_id: 0,
            action_id: 0,
            message_id,
            message_type: MessageType::Cancel,
            payload_type: 0,
            payload: vec![],
        };
        self.send_frame(&frame).await
    }

    /// Reads one chunk, decodes as many complete frames as are now
    /// buffered, and dispatches each. Returns `Ok(false)` at end-of-stream.
    /// A framing violation closes the socket and fails every pending call
    /// with `Disconnected`, per §7's protocol-error policy.
    pub async fn pump(&self) -> Result<bool, CoreError> {
        let mut chunk = [0u8; READ_CHUNK];
        let read = self.reader.lock().read(&mut chunk).await?;
        if read == 0 {
            self.close(CoreError::new(codes::DISCONNECTED, "peer closed the socket")).await;
            return Ok(false);
        }
        self.read_buf.lock().extend_from_slice(&chunk[..read]);

        loop {
            let decoded = Frame::decode(&mut self.read_buf.lock());
            match decoded {
                Ok(Some(frame)) => {
                    if let Some(reply) = self.dispatcher.dispatch_incoming(frame) {
                        self.send_frame(&reply).await?;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    self.close(CoreError::new(codes::DISCONNECTED, "protocol violation closed the socket")).await;
                    return Err(error);
                }
            }
        }
        Ok(true)
    }

    async fn close(&self, reason: CoreError) {
        *self.state.lock() = SocketState::Closing;
        self.dispatcher.fail_all_pending(|| CoreError::new(reason.code(), reason.message().to_string()));
        let _ = self.writer.lock().shutdown().await;
        *self.state.lock() = SocketState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc as StdArc;

    /// A loopback pair: bytes written to one end are read from the other.
    /// `read` yields instead of reporting a spurious end-of-stream while the
    /// peer simply hasn't written yet; only `shutdown` produces a real EOF.
    struct PipeHalf {
        outgoing: StdArc<Mutex<VecDeque<u8>>>,
        incoming: StdArc<Mutex<VecDeque<u8>>>,
        closed: StdArc<AtomicBool>,
    }

    fn pipe_pair() -> (Channel, Channel) {
        let a_to_b = StdArc::new(Mutex::new(VecDeque::new()));
        let b_to_a = StdArc::new(Mutex::new(VecDeque::new()));
        let a_closed = StdArc::new(AtomicBool::new(false));
        let b_closed = StdArc::new(AtomicBool::new(false));

        let a_reader = PipeHalf { outgoing: a_to_b.clone(), incoming: b_to_a.clone(), closed: a_closed.clone() };
        let a_writer = PipeHalf { outgoing: a_to_b.clone(), incoming: b_to_a.clone(), closed: a_closed };
        let b_reader = PipeHalf { outgoing: b_to_a.clone(), incoming: a_to_b.clone(), closed: b_closed.clone() };
        let b_writer = PipeHalf { outgoing: b_to_a, incoming: a_to_b, closed: b_closed };

        (Channel::new(Box::new(a_reader), Box::new(a_writer)), Channel::new(Box::new(b_reader), Box::new(b_writer)))
    }

    #[async_trait]
    impl ChannelReader for PipeHalf {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
            loop {
                {
                    let mut incoming = self.incoming.lock();
                    if !incoming.is_empty() {
                        let n = incoming.len().min(buf.len());
                        for slot in buf.iter_mut().take(n) {
                            *slot = incoming.pop_front().unwrap();
                        }
                        return Ok(n);
                    }
                }
                if self.closed.load(Ordering::Acquire) {
                    return Ok(0);
                }
                tokio::task::yield_now().await;
            }
        }

        fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
            self
        }
    }

    #[async_trait]
    impl ChannelWriter for PipeHalf {
        async fn write_all(&mut self, buf: &[u8]) -> Result<(), CoreError> {
            self.outgoing.lock().extend(buf.iter().copied());
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), CoreError> {
            self.closed.store(true, Ordering::Release);
            Ok(())
        }

        fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
            self
        }
    }

    #[tokio::test]
    async fn call_round_trips_through_a_bound_method() {
        use crate::meta::generic::wrap1;
        use crate::meta::object::{ObjectMeta, ObjectRegistry};
        use crate::meta::MetaMethod;

        let (client_channel, server_channel) = pipe_pair();

        let server_dispatcher = Arc::new(Dispatcher::new());
        let registry = ObjectRegistry::new();
        let mut meta = ObjectMeta::new("svc");
        meta.add_method(MetaMethod::new(1, "double::(i32)i32")).unwrap();
        let record = registry.register(1, meta);
        server_dispatcher.expose(1, 1, record);
        server_dispatcher.bind_method(1, 1, 1, Arc::new(wrap1(|x: i32| x * 2)));
        let server_socket = Arc::new(Socket::new(server_channel, server_dispatcher));

        let client_dispatcher = Arc::new(Dispatcher::new());
        let client_socket = Arc::new(Socket::new(client_channel, client_dispatcher));

        let pumping = {
            let server_socket = server_socket.clone();
            tokio::spawn(async move {
                // One pump reads the Call frame and writes back its Reply in
                // the same iteration (see `Dispatcher::dispatch_incoming`).
                server_socket.pump().await.unwrap();
            })
        };

        let result = client_socket
            .call(1, 1, 1, &Value::set_int(32, 9).unwrap(), &TypeDescriptor::int(true, 32))
            .await
            .unwrap();

        pumping.await.unwrap();
        assert_eq!(result.to_int().unwrap(), 18);
    }

    #[tokio::test]
    async fn cancel_resolves_the_callers_own_future_without_a_peer() {
        let (client_channel, _server_channel) = pipe_pair();
        let client_dispatcher = Arc::new(Dispatcher::new());
        let client_socket = Arc::new(Socket::new(client_channel, client_dispatcher));

        let message_id = client_socket.dispatcher().next_message_id();
        let pending = client_socket.dispatcher().register_pending(message_id);

        client_socket.cancel(message_id).await.unwrap();

        let result = pending.await.expect("cancel resolves the pending call locally");
        assert_eq!(result.unwrap_err().code(), codes::CANCELLED);
    }
}

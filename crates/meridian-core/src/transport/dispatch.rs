//! Routes incoming frames to registered meta-members and completes pending
//! caller futures (`spec.md` §4.H).
//!
//! `Dispatcher` owns two independent wirings deliberately kept apart: the
//! wire-facing `(serviceId, objectId, actionId)` tables used to route
//! frames arriving from a peer, and the local `ObjectId`-keyed table used
//! to follow a signal's `Forward` subscribers, which never go over the
//! wire (`spec.md` §9 "Cyclic object graphs").

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use dashmap::DashMap;
use futures_channel::oneshot;
use tracing::warn;

use super::codec::{decode_value, encode_value, kind_wire_tag};
use super::frame::{Frame, MessageType};
use crate::error::{codes, CoreError};
use crate::meta::generic::GenericFunction;
use crate::meta::object::{ObjectId, ObjectRecord};
use crate::types::descriptor::{Kind, TypeDescriptor};
use crate::types::value::Value;

/// A pending call's completion is the raw reply `Frame`, not a decoded
/// `Value`: only the caller that issued the `Call` knows the expected
/// return descriptor to decode it against.
type PendingReply = oneshot::Sender<Result<Frame, CoreError>>;

#[derive(Default)]
pub struct Dispatcher {
    exposed: DashMap<(u32, u32), Arc<ObjectRecord>>,
    method_bindings: DashMap<(u32, u32, u32), Arc<GenericFunction>>,
    signal_arg_shapes: DashMap<(u32, u32, u32), Arc<TypeDescriptor>>,
    local_methods: DashMap<(ObjectId, u32), Arc<GenericFunction>>,
    next_message_id: AtomicU32,
    pending: DashMap<u32, PendingReply>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes `record` for wire dispatch under `(service_id, object_id)`.
    pub fn expose(&self, service_id: u32, object_id: u32, record: Arc<ObjectRecord>) {
        self.exposed.insert((service_id, object_id), record);
    }

    /// Binds the callable invoked for `Call` frames addressed to
    /// `(service_id, object_id, action_id)`.
    pub fn bind_method(&self, service_id: u32, object_id: u32, action_id: u32, function: Arc<GenericFunction>) {
        self.method_bindings.insert((service_id, object_id, action_id), function);
    }

    /// Records the argument shape for a signal so incoming `Post`/`Event`
    /// payloads can be decoded before reaching `emit`.
    pub fn bind_signal_args(&self, service_id: u32, object_id: u32, action_id: u32, args: Arc<TypeDescriptor>) {
        self.signal_arg_shapes.insert((service_id, object_id, action_id), args);
    }

    /// Registers a callable a `Forward` subscriber elsewhere in this process
    /// may target by `(object_id, method_id)`.
    pub fn bind_local_method(&self, object_id: ObjectId, method_id: u32, function: Arc<GenericFunction>) {
        self.local_methods.insert((object_id, method_id), function);
    }

    pub fn next_message_id(&self) -> u32 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed).max(1)
    }

    /// Registers a pending `Call` awaiting its `Reply`/`Error`/`Cancel`.
    pub fn register_pending(&self, message_id: u32) -> oneshot::Receiver<Result<Frame, CoreError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(message_id, tx);
        rx
    }

    fn complete_pending(&self, message_id: u32, result: Result<Frame, CoreError>) -> bool {
        match self.pending.remove(&message_id) {
            Some((_, tx)) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Completes every still-pending call with `error` (`spec.md` §7:
    /// "protocol ... completes all in-flight calls on it with
    /// Disconnected").
    pub fn fail_all_pending(&self, error: impl Fn() -> CoreError) {
        let keys: Vec<u32> = self.pending.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            self.complete_pending(key, Err(error()));
        }
    }

    /// Resolves a caller-initiated cancellation locally, without waiting for
    /// the peer. Returns `false` if the call already completed (reply,
    /// error, or an earlier cancel) before this one landed.
    pub(crate) fn cancel_pending(&self, message_id: u32) -> bool {
        self.complete_pending(message_id, Err(CoreError::cancelled()))
    }

    /// Dispatches one incoming frame. Returns the frame (if any) the socket
    /// should write back: `Call` always produces exactly one `Reply` or
    /// `Error`; `Post`/`Event`/`Reply`/`Error`/`Cancel` produce nothing.
    pub fn dispatch_incoming(&self, frame: Frame) -> Option<Frame> {
        match frame.message_type {
            MessageType::Call => Some(self.dispatch_call(frame)),
            MessageType::Post | MessageType::Event => {
                self.dispatch_signal(&frame);
                None
            }
            MessageType::Reply => {
                self.complete_reply(frame, true);
                None
            }
            MessageType::Error => {
                self.complete_reply(frame, false);
                None
            }
            MessageType::Cancel => {
                self.complete_pending(frame.message_id, Err(CoreError::cancelled()));
                None
            }
            MessageType::Capability => None,
        }
    }

    fn complete_reply(&self, frame: Frame, is_success: bool) {
        let message_id = frame.message_id;
        let result = if is_success {
            Ok(frame)
        } else {
            let text = String::from_utf8(frame.payload.clone()).unwrap_or_else(|_| "malformed error payload".to_string());
            let (code, message) = match text.split_once(": ") {
                Some((code, message)) => (known_code(code).unwrap_or(codes::PROTOCOL_ERROR), message.to_string()),
                None => (codes::PROTOCOL_ERROR, text),
            };
            Err(CoreError::new(code, message))
        };
        if !self.complete_pending(message_id, result) {
            warn!(target: "meridian_core::dispatch", message_id, "reply for unknown or already-completed call");
        }
    }

    fn dispatch_call(&self, frame: Frame) -> Frame {
        let key = (frame.service_id, frame.object_id);
        let Some(record) = self.exposed.get(&key) else {
            return error_reply(&frame, codes::NOT_FOUND, "unknown service/object");
        };
        let method_exists = record.meta().read().method(frame.action_id).is_some();
        if !method_exists {
            return error_reply(&frame, codes::NOT_FOUND, "unknown method");
        }
        let Some(function) = self.method_bindings.get(&(frame.service_id, frame.object_id, frame.action_id)) else {
            return error_reply(&frame, codes::PROTOCOL_ERROR, "method registered without a bound callable");
        };

        let args_shape = TypeDescriptor::tuple(function.arg_descriptors().to_vec());
        let mut buf = BytesMut::from(&frame.payload[..]);
        let args_value = match decode_value(&args_shape, &mut buf) {
            Ok(value) => value,
            Err(error) => return error_reply(&frame, codes::CONVERSION_FAILED, error.message()),
        };
        let args = args_value.as_tuple().expect("tuple shape decodes to Tuple storage").clone();

        match function.call(&args) {
            Ok(result) => {
                let mut payload = BytesMut::new();
                if let Err(error) = encode_value(&result, &mut payload) {
                    return error_reply(&frame, codes::PROTOCOL_ERROR, error.message());
                }
                Frame {
                    service_id: frame.service_id,
                    object_id: frame.object_id,
                    action_id: frame.action_id,
                    message_id: frame.message_id,
                    message_type: MessageType::Reply,
                    payload_type: kind_wire_tag(result.kind()),
                    payload: payload.to_vec(),
                }
            }
            Err(error) => error_reply(&frame, error.code(), error.message()),
        }
    }

    fn dispatch_signal(&self, frame: &Frame) {
        let key = (frame.service_id, frame.object_id);
        let Some(record) = self.exposed.get(&key) else {
            warn!(target: "meridian_core::dispatch", ?key, "event for unknown service/object");
            return;
        };
        let Some(args_shape) = self.signal_arg_shapes.get(&(frame.service_id, frame.object_id, frame.action_id)) else {
            warn!(target: "meridian_core::dispatch", action_id = frame.action_id, "event for a signal with no registered argument shape");
            return;
        };
        let mut buf = BytesMut::from(&frame.payload[..]);
        let args_value = match decode_value(&args_shape, &mut buf) {
            Ok(value) => value,
            Err(error) => {
                warn!(target: "meridian_core::dispatch", %error, "failed to decode event payload");
                return;
            }
        };
        let args = match args_value.as_tuple() {
            Some(items) => items.clone(),
            None => return,
        };

        let meta = record.meta().read();
        let Some(signal) = meta.signal(frame.action_id) else {
            warn!(target: "meridian_core::dispatch", action_id = frame.action_id, "event for an unknown signal id");
            return;
        };
        let subscribers = signal.subscribers().clone();
        drop(meta);
        subscribers.emit(&args, |target_object, target_method, call_args| self.forward(target_object, target_method, call_args));
    }

    fn forward(&self, target_object: ObjectId, target_method: u32, args: &[Value]) -> Result<(), CoreError> {
        match self.local_methods.get(&(target_object, target_method)) {
            Some(function) => function.call(args).map(|_| ()),
            None => Err(CoreError::new(codes::NOT_FOUND, "forward target has no bound local method")),
        }
    }
}

/// Maps a decoded error-reply code string back to its stable `&'static str`
/// constant so `CoreError::code()` keeps returning an interned value.
fn known_code(text: &str) -> Option<&'static str> {
    const ALL: &[&str] = &[
        codes::SUCCESS,
        codes::BAD_ADDRESS,
        codes::HOST_NOT_FOUND,
        codes::CONNECTION_REFUSED,
        codes::TIMED_OUT,
        codes::CANCELLED,
        codes::DISCONNECTED,
        codes::HANDSHAKE_FAILED,
        codes::PROTOCOL_ERROR,
        codes::NOT_FOUND,
        codes::CONVERSION_FAILED,
        codes::OVERFLOW,
        codes::INTERNAL,
    ];
    ALL.iter().find(|&&candidate| candidate == text).copied()
}

fn error_reply(frame: &Frame, code: &'static str, message: impl Into<String>) -> Frame {
    Frame {
        service_id: frame.service_id,
        object_id: frame.object_id,
        action_id: frame.action_id,
        message_id: frame.message_id,
        message_type: MessageType::Error,
        payload_type: kind_wire_tag(Kind::String),
        payload: format!("{code}: {}", message.into()).into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::generic::wrap1;
    use crate::meta::object::{ObjectMeta, ObjectRegistry};
    use crate::meta::MetaMethod;

    fn make_call_frame(service: u32, object: u32, action: u32, message_id: u32, payload: Vec<u8>) -> Frame {
        Frame {
            service_id: service,
            object_id: object,
            action_id: action,
            message_id,
            message_type: MessageType::Call,
            payload_type: 0,
            payload,
        }
    }

    #[test]
    fn call_to_unknown_object_replies_with_not_found() {
        let dispatcher = Dispatcher::new();
        let frame = make_call_frame(1, 1, 1, 1, vec![]);
        let reply = dispatcher.dispatch_incoming(frame).expect("call always replies");
        assert_eq!(reply.message_type, MessageType::Error);
    }

    #[test]
    fn call_to_bound_method_replies_with_encoded_result() {
        let dispatcher = Dispatcher::new();
        let registry = ObjectRegistry::new();
        let mut meta = ObjectMeta::new("svc");
        meta.add_method(MetaMethod::new(1, "double::(i32)i32")).unwrap();
        let record = registry.register(1, meta);
        dispatcher.expose(1, 1, record);
        dispatcher.bind_method(1, 1, 1, Arc::new(wrap1(|x: i32| x * 2)));

        let mut payload = BytesMut::new();
        encode_value(&Value::set_int(32, 21).unwrap(), &mut payload).unwrap();
        let frame = make_call_frame(1, 1, 1, 7, payload.to_vec());
        let reply = dispatcher.dispatch_incoming(frame).unwrap();
        assert_eq!(reply.message_type, MessageType::Reply);
        let mut reply_buf = BytesMut::from(&reply.payload[..]);
        let value = decode_value(&TypeDescriptor::int(true, 32), &mut reply_buf).unwrap();
        assert_eq!(value.to_int().unwrap(), 42);
    }

    #[test]
    fn cancel_completes_pending_call_with_cancelled() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.register_pending(5);
        let cancel_frame = Frame {
            service_id: 1,
            object_id: 1,
            action_id: 1,
            message_id: 5,
            message_type: MessageType::Cancel,
            payload_type: 0,
            payload: vec![],
        };
        assert!(dispatcher.dispatch_incoming(cancel_frame).is_none());
        let result = rx.try_recv().unwrap().expect("sender was not dropped");
        assert_eq!(result.unwrap_err().code(), codes::CANCELLED);
    }

    #[test]
    fn event_for_unknown_signal_does_not_panic() {
        let dispatcher = Dispatcher::new();
        let registry = ObjectRegistry::new();
        let record = registry.register(1, ObjectMeta::new("svc"));
        dispatcher.expose(1, 1, record);
        let frame = Frame {
            service_id: 1,
            object_id: 1,
            action_id: 99,
            message_id: 1,
            message_type: MessageType::Event,
            payload_type: 0,
            payload: vec![],
        };
        assert!(dispatcher.dispatch_incoming(frame).is_none());
    }
}

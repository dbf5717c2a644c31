//! A signal arriving as a wire `Event` frame is forwarded to a local
//! object's bound method (`spec.md` §9 "Cyclic object graphs"), and
//! disconnecting the forward before the event arrives suppresses the call
//! entirely (§8 "disconnect(ℓ) followed by emit(S, x) does not invoke f").

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use meridian_core::meta::generic::wrap1;
use meridian_core::meta::object::{ObjectId, ObjectMeta, ObjectRegistry};
use meridian_core::meta::signal::Subscriber;
use meridian_core::meta::{MetaMethod, MetaSignal};
use meridian_core::transport::{encode_value, Dispatcher, Frame, MessageType};
use meridian_core::types::{TypeDescriptor, Value};

fn event_frame(service_id: u32, object_id: u32, action_id: u32, args: &Value) -> Frame {
    let mut payload = BytesMut::new();
    encode_value(args, &mut payload).unwrap();
    Frame {
        service_id,
        object_id,
        action_id,
        message_id: 0,
        message_type: MessageType::Event,
        payload_type: 0,
        payload: payload.to_vec(),
    }
}

fn tuple_of(values: Vec<Value>) -> Value {
    let descriptors = values.iter().map(|v| v.descriptor().clone()).collect();
    Value::new_owning(
        TypeDescriptor::tuple(descriptors),
        meridian_core::types::Storage::Tuple(Arc::new(values)),
    )
}

#[test]
fn event_forwards_to_a_bound_local_method() {
    let dispatcher = Dispatcher::new();
    let registry = ObjectRegistry::new();

    let mut source_meta = ObjectMeta::new("source");
    source_meta.add_signal(MetaSignal::new(1, "onTick::(i32)")).unwrap();

    let target_id = fresh_object_id();
    source_meta
        .signal_mut(1)
        .unwrap()
        .subscribers()
        .connect(Subscriber::Forward { target_object: target_id, target_method: 1 });

    let source_record = registry.register(1, source_meta);
    dispatcher.expose(1, 1, source_record);
    dispatcher.bind_signal_args(1, 1, 1, TypeDescriptor::tuple(vec![TypeDescriptor::int(true, 32)]));

    let observed = Arc::new(AtomicI32::new(0));
    let observed_clone = observed.clone();
    dispatcher.bind_local_method(target_id, 1, Arc::new(wrap1(move |value: i32| {
        observed_clone.store(value, Ordering::SeqCst);
        value
    })));

    let frame = event_frame(1, 1, 1, &tuple_of(vec![Value::set_int(32, 99).unwrap()]));
    assert!(dispatcher.dispatch_incoming(frame).is_none());
    assert_eq!(observed.load(Ordering::SeqCst), 99);
}

#[test]
fn disconnected_forward_is_never_invoked() {
    let dispatcher = Dispatcher::new();
    let registry = ObjectRegistry::new();

    let mut source_meta = ObjectMeta::new("source");
    source_meta.add_signal(MetaSignal::new(1, "onTick::(i32)")).unwrap();
    let target_id = fresh_object_id();
    let link = source_meta
        .signal_mut(1)
        .unwrap()
        .subscribers()
        .connect(Subscriber::Forward { target_object: target_id, target_method: 1 });
    assert!(source_meta.signal(1).unwrap().subscribers().disconnect(link));

    let source_record = registry.register(1, source_meta);
    dispatcher.expose(1, 1, source_record);
    dispatcher.bind_signal_args(1, 1, 1, TypeDescriptor::tuple(vec![TypeDescriptor::int(true, 32)]));

    let observed = Arc::new(AtomicI32::new(0));
    let observed_clone = observed.clone();
    dispatcher.bind_local_method(target_id, 1, Arc::new(wrap1(move |value: i32| {
        observed_clone.store(value, Ordering::SeqCst);
        value
    })));

    let frame = event_frame(1, 1, 1, &tuple_of(vec![Value::set_int(32, 99).unwrap()]));
    assert!(dispatcher.dispatch_incoming(frame).is_none());
    assert_eq!(observed.load(Ordering::SeqCst), 0, "disconnected forward must not run");
}

/// `ObjectId` has no public constructor outside an `ObjectRegistry`
/// registration, so the forward target here is itself a registered (but
/// otherwise unused) object, matching how a real service graph would obtain
/// one object's id to hand to another.
fn fresh_object_id() -> ObjectId {
    let registry = ObjectRegistry::new();
    registry.register(1, ObjectMeta::new("target")).id()
}

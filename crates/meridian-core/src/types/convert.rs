//! Conversion engine (`spec.md` §4.C): rewrites a `Value` into the shape
//! described by a target [`TypeDescriptor`], following twelve ordered rules,
//! first match wins.
//!
//! A failed conversion is represented as `Ok(None)` rather than an `Err`:
//! per §4.C, "when the returned result is empty ... conversion failed; the
//! caller treats this as an error", which is a data outcome distinct from a
//! transport or programmer-misuse error.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::warn;

use super::descriptor::{Kind, Shape, TypeDescriptor, TypeInfo};
use super::value::{Storage, Value};
use crate::meta::object::ObjectId;

/// Outcome of [`convert`]. `mustDestroy` in the source terminology maps to
/// whether the result is an owning `Value` the caller is now responsible
/// for; a borrowing result shares the source's storage and must not be
/// dropped ahead of it.
pub struct Conversion {
    pub result: Option<Value>,
    pub must_destroy: bool,
}

impl Conversion {
    fn owning(value: Value) -> Self {
        Self {
            result: Some(value),
            must_destroy: true,
        }
    }

    fn borrowing(value: Value) -> Self {
        Self {
            result: Some(value),
            must_destroy: false,
        }
    }

    fn failed() -> Self {
        Self {
            result: None,
            must_destroy: false,
        }
    }
}

/// A factory that turns an `Object` value into a typed proxy for a given
/// pointee `TypeInfo` (rule 7, "ObjectPtr -> Pointer-to-Object"). Keyed by
/// the pointed-to object's `TypeInfo`, per the design notes' "id-indexed
/// factory".
pub trait ProxyGenerator: Send + Sync {
    fn generate(&self, object: ObjectId, pointee: &Arc<TypeDescriptor>) -> Value;
}

static PROXY_GENERATORS: OnceLock<DashMap<TypeInfo, Arc<dyn ProxyGenerator>>> = OnceLock::new();

fn proxy_generators() -> &'static DashMap<TypeInfo, Arc<dyn ProxyGenerator>> {
    PROXY_GENERATORS.get_or_init(DashMap::new)
}

/// Registers a proxy generator for `pointee`'s `TypeInfo`. Process-wide, like
/// the type registry (`spec.md` §9 "Global state").
pub fn register_proxy_generator(pointee: TypeInfo, generator: Arc<dyn ProxyGenerator>) {
    proxy_generators().insert(pointee, generator);
}

/// `convert(source, targetDescriptor)`: the twelve-rule engine.
pub fn convert(source: &Value, target: &Arc<TypeDescriptor>) -> Conversion {
    // Rule 1: identity short-circuit.
    if source.descriptor() == target {
        return Conversion::borrowing(source.clone_value_borrowed());
    }

    // Rule 2: null-guard.
    if source.descriptor().is_null() || target.is_null() {
        return Conversion::failed();
    }

    // Rule 3: same-kind dispatch.
    if source.kind() == target.kind() {
        if let Some(outcome) = same_kind(source, target) {
            return outcome;
        }
    }

    // Rule 4: cross-kind numeric.
    if let Some(outcome) = cross_kind_numeric(source, target) {
        return outcome;
    }

    // Rule 5: String <-> Raw.
    if let Some(outcome) = string_raw(source, target) {
        return outcome;
    }

    // Rule 6: Dynamic wrapping.
    if target.kind() == Kind::Dynamic {
        return Conversion::owning(Value::new_owning(target.clone(), Storage::Dynamic(Arc::new(source.clone_value()))));
    }

    // Rule 7: ObjectPtr -> Pointer-to-Object via the proxy generator map.
    if source.kind() == Kind::Object {
        if let Shape::Pointer { pointee } = target.shape() {
            if pointee.kind() == Kind::Object {
                if let Ok(object_id) = source.to_object() {
                    if let Some(generator) = proxy_generators().get(&pointee.type_info()) {
                        return Conversion::owning(generator.generate(object_id, pointee));
                    }
                }
            }
        }
    }

    // Rule 8: Dynamic unwrapping -- re-enter the rule list against the inner value.
    if let Storage::Dynamic(inner) = source.storage() {
        return convert(inner, target);
    }

    // Rule 9: Object -> Pointer: recurse with the pointed-to type, then re-pointerize.
    if source.kind() == Kind::Object {
        if let Shape::Pointer { pointee } = target.shape() {
            let inner = convert(source, pointee);
            return match inner.result {
                Some(value) => {
                    let pointer = Value::new_owning(target.clone(), Storage::Pointer(Arc::new(value)));
                    Conversion::owning(pointer)
                }
                None => Conversion::failed(),
            };
        }
    }

    // Rule 10: object inheritance offset.
    if let Shape::Object { inherits: Some(inherits), .. } = source.descriptor().shape() {
        if inherits.base.as_ref() == target.as_ref() {
            // Offset is always 0 in this implementation (see DESIGN.md): objects
            // are addressed by ObjectId, not by byte layout, so "borrowing at
            // storage + k" degenerates to sharing the same storage.
            return Conversion::borrowing(source.clone_value_borrowed());
        }
    }

    // Rule 11: TypeInfo match fallback.
    if source.descriptor().type_info() == target.type_info() {
        return Conversion::borrowing(source.clone_value_borrowed());
    }

    // Rule 12: otherwise fail.
    Conversion::failed()
}

fn same_kind(source: &Value, target: &Arc<TypeDescriptor>) -> Option<Conversion> {
    match (source.storage(), target.shape()) {
        (Storage::Float(v), Shape::Float { width }) => {
            Some(Conversion::owning(Value::set_double(*width, *v)))
        }
        (Storage::Raw(bytes), Shape::Scalar) if target.kind() == Kind::Raw => {
            Some(Conversion::owning(Value::new_owning(target.clone(), Storage::Raw(bytes.clone()))))
        }
        (Storage::Dynamic(inner), Shape::Scalar) if target.kind() == Kind::Dynamic => {
            Some(Conversion::owning(Value::new_owning(target.clone(), Storage::Dynamic(Arc::new(inner.clone_value())))))
        }
        (Storage::Int(_), Shape::Int { signed, width }) => {
            let Shape::Int { signed: source_signed, .. } = source.descriptor().shape() else {
                return None;
            };
            let outcome = if *source_signed {
                source.to_int().and_then(|v| Value::set_int(*width, v))
            } else {
                source.to_uint().and_then(|v| {
                    if *signed {
                        Value::set_int(*width, v as i64)
                    } else {
                        Value::set_uint(*width, v)
                    }
                })
            };
            Some(match outcome {
                Ok(value) => Conversion::owning(value),
                Err(_) => Conversion::failed(),
            })
        }
        (Storage::Str(_), Shape::Scalar) if target.kind() == Kind::String => {
            if source.descriptor().type_info() == target.type_info() {
                Some(Conversion::borrowing(source.clone_value_borrowed()))
            } else {
                let text = source.to_str().expect("storage matched Str above").to_owned();
                Some(Conversion::owning(Value::set_string(text)))
            }
        }
        (Storage::List(items), Shape::List { element: target_element }) => {
            let Shape::List { element: source_element } = source.descriptor().shape() else {
                return None;
            };
            Some(convert_list(items, source_element, target, target_element))
        }
        (Storage::Map(entries), Shape::Map { key: target_key, value: target_value }) => {
            Some(convert_map(entries, target, target_key, target_value))
        }
        (Storage::Tuple(items), Shape::Tuple { members: target_members }) => {
            Some(convert_tuple(items, target, target_members))
        }
        (Storage::Pointer(pointee), Shape::Pointer { pointee: target_pointee }) => {
            Some(convert_pointer(pointee, target, target_pointee))
        }
        _ => None,
    }
}

fn convert_list(
    items: &Arc<Vec<Value>>,
    source_element: &Arc<TypeDescriptor>,
    target: &Arc<TypeDescriptor>,
    target_element: &Arc<TypeDescriptor>,
) -> Conversion {
    let same_element = source_element.type_info() == target_element.type_info();
    let mut converted = Vec::with_capacity(items.len());
    for item in items.iter() {
        if same_element {
            converted.push(item.clone_value());
            continue;
        }
        let inner = convert(item, target_element);
        match inner.result {
            Some(value) => converted.push(value),
            None => return Conversion::failed(),
        }
    }
    Conversion::owning(Value::new_owning(target.clone(), Storage::List(Arc::new(converted))))
}

fn convert_map(
    entries: &Arc<Vec<(Value, Value)>>,
    target: &Arc<TypeDescriptor>,
    target_key: &Arc<TypeDescriptor>,
    target_value: &Arc<TypeDescriptor>,
) -> Conversion {
    let mut converted = Vec::with_capacity(entries.len());
    for (key, value) in entries.iter() {
        let same_key = key.descriptor().type_info() == target_key.type_info();
        let same_value = value.descriptor().type_info() == target_value.type_info();
        let converted_key = if same_key {
            key.clone_value()
        } else {
            match convert(key, target_key).result {
                Some(v) => v,
                None => return Conversion::failed(),
            }
        };
        let converted_value = if same_value {
            value.clone_value()
        } else {
            match convert(value, target_value).result {
                Some(v) => v,
                None => return Conversion::failed(),
            }
        };
        converted.push((converted_key, converted_value));
    }
    Conversion::owning(Value::new_owning(target.clone(), Storage::Map(Arc::new(converted))))
}

fn convert_tuple(items: &Arc<Vec<Value>>, target: &Arc<TypeDescriptor>, target_members: &[Arc<TypeDescriptor>]) -> Conversion {
    if items.len() != target_members.len() {
        return Conversion::failed();
    }
    let mut converted = Vec::with_capacity(items.len());
    for (item, member_descriptor) in items.iter().zip(target_members.iter()) {
        if item.descriptor().type_info() == member_descriptor.type_info() {
            converted.push(item.clone_value());
            continue;
        }
        match convert(item, member_descriptor).result {
            Some(value) => converted.push(value),
            None => return Conversion::failed(),
        }
    }
    Conversion::owning(Value::new_owning(target.clone(), Storage::Tuple(Arc::new(converted))))
}

fn convert_pointer(pointee: &Arc<Value>, target: &Arc<TypeDescriptor>, target_pointee: &Arc<TypeDescriptor>) -> Conversion {
    if pointee.kind() == Kind::Object && target_pointee.kind() == Kind::Object {
        let inner = convert(pointee, target_pointee);
        return match inner.result {
            Some(value) => Conversion::owning(Value::new_owning(target.clone(), Storage::Pointer(Arc::new(value)))),
            None => Conversion::failed(),
        };
    }
    if pointee.descriptor().type_info() == target_pointee.type_info() {
        return Conversion::borrowing(Value::new_borrowing(target.clone(), Storage::Pointer(pointee.clone())));
    }
    warn!(target: "meridian_core::convert", "allocated converted pointer reference is a programming error");
    Conversion::failed()
}

fn cross_kind_numeric(source: &Value, target: &Arc<TypeDescriptor>) -> Option<Conversion> {
    match (source.kind(), target.kind()) {
        (Kind::Float, Kind::Int) => {
            let Shape::Int { signed, width } = target.shape() else { return None };
            let raw = source.to_double().ok()?;
            let outcome = if *signed {
                Value::set_int(*width, raw as i64)
            } else {
                Value::set_uint(*width, raw as u64)
            };
            Some(match outcome {
                Ok(value) => Conversion::owning(value),
                Err(_) => Conversion::failed(),
            })
        }
        (Kind::Int, Kind::Float) => {
            let Shape::Float { width } = target.shape() else { return None };
            let Shape::Int { signed, .. } = source.descriptor().shape() else { return None };
            let raw = if *signed {
                source.to_int().ok()? as f64
            } else {
                source.to_uint().ok()? as f64
            };
            Some(Conversion::owning(Value::set_double(*width, raw)))
        }
        _ => None,
    }
}

fn string_raw(source: &Value, target: &Arc<TypeDescriptor>) -> Option<Conversion> {
    match (source.kind(), target.kind()) {
        (Kind::String, Kind::Raw) => {
            let text = source.to_str().ok()?;
            let bytes: Arc<[u8]> = Arc::from(text.as_bytes());
            Some(Conversion::owning(Value::new_owning(target.clone(), Storage::Raw(bytes))))
        }
        // Raw -> String is rejected: arbitrary bytes are not guaranteed UTF-8.
        (Kind::Raw, Kind::String) => Some(Conversion::failed()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::descriptor::TypeDescriptor;

    fn int_list(values: &[i64], width: u8) -> Value {
        let elements: Vec<Value> = values.iter().map(|v| Value::set_int(width, *v).unwrap()).collect();
        Value::new_owning(TypeDescriptor::list(TypeDescriptor::int(true, width)), Storage::List(Arc::new(elements)))
    }

    #[test]
    fn identity_short_circuits_without_allocating() {
        let value = Value::set_int(32, 7).unwrap();
        let target = value.descriptor().clone();
        let outcome = convert(&value, &target);
        assert!(!outcome.must_destroy);
        assert_eq!(outcome.result.unwrap().to_int().unwrap(), 7);
    }

    #[test]
    fn int_list_widens_element_by_element() {
        let source = int_list(&[1, 2, 3], 32);
        let target = TypeDescriptor::list(TypeDescriptor::int(true, 64));
        let outcome = convert(&source, &target);
        let result = outcome.result.expect("widening must succeed");
        let items = result.as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].to_int().unwrap(), 1);
    }

    #[test]
    fn int_list_narrowing_overflow_fails_and_leaves_source_untouched() {
        let source = int_list(&[1i64 << 40], 64);
        let target = TypeDescriptor::list(TypeDescriptor::int(true, 32));
        let outcome = convert(&source, &target);
        assert!(outcome.result.is_none());
        assert_eq!(source.as_list().unwrap()[0].to_int().unwrap(), 1i64 << 40);
    }

    #[test]
    fn string_to_raw_copies_bytes() {
        let source = Value::set_string("hi");
        let outcome = convert(&source, &TypeDescriptor::raw());
        let result = outcome.result.unwrap();
        match result.storage() {
            Storage::Raw(bytes) => assert_eq!(bytes.as_ref(), b"hi"),
            _ => panic!("expected Raw storage"),
        }
    }

    #[test]
    fn raw_to_string_is_rejected() {
        let source = Value::new_owning(TypeDescriptor::raw(), Storage::Raw(Arc::from(&b"hi"[..])));
        let outcome = convert(&source, &TypeDescriptor::string());
        assert!(outcome.result.is_none());
    }

    #[test]
    fn dynamic_wraps_then_unwraps_round_trip() {
        let source = Value::set_int(32, 42).unwrap();
        let wrapped = convert(&source, &TypeDescriptor::dynamic()).result.unwrap();
        let unwrapped = convert(&wrapped, &TypeDescriptor::int(true, 32)).result.unwrap();
        assert_eq!(unwrapped.to_int().unwrap(), 42);
    }

    #[test]
    fn tuple_preserves_borrowed_member_on_matching_type_info() {
        let a = Value::set_int(32, 1).unwrap();
        let b = Value::set_string("tag");
        let source = Value::new_owning(
            TypeDescriptor::tuple(vec![a.descriptor().clone(), b.descriptor().clone()]),
            Storage::Tuple(Arc::new(vec![a, b])),
        );
        let target = TypeDescriptor::tuple(vec![TypeDescriptor::int(true, 64), TypeDescriptor::string()]);
        let outcome = convert(&source, &target);
        let result = outcome.result.unwrap();
        let members = result.as_tuple().unwrap();
        assert_eq!(members[0].to_int().unwrap(), 1);
        assert_eq!(members[1].to_str().unwrap(), "tag");
    }

    #[test]
    fn float_cross_kind_to_int_checks_overflow() {
        let source = Value::set_double(64, 1e20);
        let outcome = convert(&source, &TypeDescriptor::int(true, 32));
        assert!(outcome.result.is_none());
    }

    #[test]
    fn unrelated_kinds_fail_closed() {
        let source = Value::set_int(32, 1).unwrap();
        let target = TypeDescriptor::tuple(vec![]);
        let outcome = convert(&source, &target);
        assert!(outcome.result.is_none());
    }
}

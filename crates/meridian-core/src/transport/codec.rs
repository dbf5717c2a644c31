//! Descriptor-driven payload serialization (`spec.md` §6): fixed-width
//! integers and floats verbatim; strings as `uint32 length + bytes`; lists
//! as `uint32 count + elements`; maps as `uint32 count + (key,value)*`;
//! tuples as concatenated members in declared order; dynamics as
//! `signature-string + payload`.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{codes, CoreError};
use crate::types::descriptor::{Kind, Shape, TypeDescriptor};
use crate::types::value::{Storage, Value};

/// A compact textual signature for a descriptor, used both for `Dynamic`
/// payload framing and for `MetaMethod`/`MetaSignal` signature strings.
pub fn type_signature(descriptor: &TypeDescriptor) -> String {
    match descriptor.shape() {
        Shape::Scalar => match descriptor.kind() {
            Kind::Void => "v".to_string(),
            Kind::String => "s".to_string(),
            Kind::Raw => "r".to_string(),
            Kind::Dynamic => "d".to_string(),
            other => format!("?{other:?}"),
        },
        Shape::Int { signed, width } => format!("{}{}", if *signed { "i" } else { "u" }, width),
        Shape::Float { width } => format!("f{width}"),
        Shape::List { element } => format!("[{}]", type_signature(element)),
        Shape::Map { key, value } => format!("{{{}:{}}}", type_signature(key), type_signature(value)),
        Shape::Tuple { members } => format!("({})", members.iter().map(|m| type_signature(m)).collect::<Vec<_>>().join(",")),
        Shape::Pointer { pointee } => format!("*{}", type_signature(pointee)),
        Shape::Object { meta, .. } => format!("o:{}", meta.name()),
        Shape::Iterator { element } => format!("it<{}>", type_signature(element)),
    }
}

/// Wire tag for a frame's `payloadType` field: a stable encoding of `Kind`
/// independent of the enum's declaration order.
pub fn kind_wire_tag(kind: Kind) -> u8 {
    match kind {
        Kind::Void => 0,
        Kind::Int => 1,
        Kind::Float => 2,
        Kind::String => 3,
        Kind::List => 4,
        Kind::Map => 5,
        Kind::Tuple => 6,
        Kind::Pointer => 7,
        Kind::Object => 8,
        Kind::Dynamic => 9,
        Kind::Raw => 10,
        Kind::Iterator => 11,
        Kind::Unknown => 255,
    }
}

/// Encodes `value` into `out` per its own descriptor's shape.
pub fn encode_value(value: &Value, out: &mut BytesMut) -> Result<(), CoreError> {
    match value.storage() {
        Storage::Void => {}
        Storage::Int(bits) => encode_int(*bits, value.descriptor().shape(), out)?,
        Storage::Float(v) => match value.descriptor().shape() {
            Shape::Float { width: 32 } => out.put_f32_le(*v as f32),
            Shape::Float { .. } => out.put_f64_le(*v),
            _ => return Err(codec_error("float storage without a float shape")),
        },
        Storage::Str(s) => encode_bytes(s.as_bytes(), out),
        Storage::Raw(bytes) => encode_bytes(bytes, out),
        Storage::List(items) => {
            out.put_u32_le(items.len() as u32);
            for item in items.iter() {
                encode_value(item, out)?;
            }
        }
        Storage::Map(entries) => {
            out.put_u32_le(entries.len() as u32);
            for (key, value) in entries.iter() {
                encode_value(key, out)?;
                encode_value(value, out)?;
            }
        }
        Storage::Tuple(items) => {
            for item in items.iter() {
                encode_value(item, out)?;
            }
        }
        Storage::Dynamic(inner) => {
            let signature = type_signature(inner.descriptor());
            encode_bytes(signature.as_bytes(), out);
            encode_value(inner, out)?;
        }
        Storage::Object(id) => out.put_u64_le(id.as_u64()),
        Storage::Pointer(pointee) => encode_value(pointee, out)?,
        Storage::Iterator(_) => {
            return Err(CoreError::new(codes::PROTOCOL_ERROR, "iterators are process-local and cannot cross the wire"));
        }
    }
    Ok(())
}

/// Decodes a value shaped like `descriptor` out of `buf`, advancing it past
/// the consumed bytes.
pub fn decode_value(descriptor: &Arc<TypeDescriptor>, buf: &mut BytesMut) -> Result<Value, CoreError> {
    match descriptor.shape() {
        Shape::Scalar if descriptor.kind() == Kind::Void => Ok(Value::void()),
        Shape::Scalar if descriptor.kind() == Kind::String => {
            let bytes = decode_bytes(buf)?;
            let text = String::from_utf8(bytes).map_err(|_| codec_error("string payload was not valid utf-8"))?;
            Ok(Value::set_string(text))
        }
        Shape::Scalar if descriptor.kind() == Kind::Raw => {
            let bytes = decode_bytes(buf)?;
            Ok(Value::new_owning(descriptor.clone(), Storage::Raw(Arc::from(bytes))))
        }
        Shape::Scalar if descriptor.kind() == Kind::Dynamic => {
            let signature_bytes = decode_bytes(buf)?;
            let _signature = String::from_utf8(signature_bytes).map_err(|_| codec_error("dynamic signature was not valid utf-8"))?;
            // The signature is informational on the wire; the process that
            // registered this Dynamic's descriptor already knows the inner
            // shape, matching the type registry's "first touch wins".
            Err(CoreError::new(
                codes::PROTOCOL_ERROR,
                "decoding a bare Dynamic requires the caller to supply the inner descriptor",
            ))
        }
        Shape::Int { signed, width } => decode_int(*signed, *width, buf),
        Shape::Float { width } => {
            require(buf.len() >= (*width as usize) / 8, "truncated float payload")?;
            let value = if *width == 32 { buf.get_f32_le() as f64 } else { buf.get_f64_le() };
            Ok(Value::set_double(*width, value))
        }
        Shape::List { element } => {
            require(buf.len() >= 4, "truncated list count")?;
            let count = buf.get_u32_le() as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_value(element, buf)?);
            }
            Ok(Value::new_owning(descriptor.clone(), Storage::List(Arc::new(items))))
        }
        Shape::Map { key, value } => {
            require(buf.len() >= 4, "truncated map count")?;
            let count = buf.get_u32_le() as usize;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let k = decode_value(key, buf)?;
                let v = decode_value(value, buf)?;
                entries.push((k, v));
            }
            Ok(Value::new_owning(descriptor.clone(), Storage::Map(Arc::new(entries))))
        }
        Shape::Tuple { members } => {
            let mut items = Vec::with_capacity(members.len());
            for member in members {
                items.push(decode_value(member, buf)?);
            }
            Ok(Value::new_owning(descriptor.clone(), Storage::Tuple(Arc::new(items))))
        }
        Shape::Pointer { pointee } => {
            let inner = decode_value(pointee, buf)?;
            Ok(Value::new_owning(descriptor.clone(), Storage::Pointer(Arc::new(inner))))
        }
        Shape::Object { .. } => {
            require(buf.len() >= 8, "truncated object id")?;
            let raw_id = buf.get_u64_le();
            let _ = raw_id;
            Err(CoreError::new(codes::PROTOCOL_ERROR, "object references cannot be reconstructed without the peer's object registry"))
        }
        Shape::Iterator { .. } => Err(CoreError::new(codes::PROTOCOL_ERROR, "iterators are process-local and cannot cross the wire")),
        Shape::Scalar => Err(codec_error("unsupported scalar kind in wire codec")),
    }
}

fn encode_int(bits: i64, shape: &Shape, out: &mut BytesMut) -> Result<(), CoreError> {
    let Shape::Int { width, .. } = shape else {
        return Err(codec_error("int storage without an int shape"));
    };
    match width {
        8 => out.put_u8(bits as u8),
        16 => out.put_u16_le(bits as u16),
        32 => out.put_u32_le(bits as u32),
        64 => out.put_u64_le(bits as u64),
        other => return Err(codec_error(&format!("unsupported int width {other}"))),
    }
    Ok(())
}

fn decode_int(signed: bool, width: u8, buf: &mut BytesMut) -> Result<Value, CoreError> {
    require(buf.len() >= (width as usize) / 8, "truncated int payload")?;
    let bits: i64 = match width {
        8 => buf.get_u8() as i64,
        16 => buf.get_u16_le() as i64,
        32 => buf.get_u32_le() as i64,
        64 => buf.get_u64_le() as i64,
        other => return Err(codec_error(&format!("unsupported int width {other}"))),
    };
    if signed {
        Value::set_int(width, bits)
    } else {
        Value::set_uint(width, bits as u64)
    }
}

fn encode_bytes(bytes: &[u8], out: &mut BytesMut) {
    out.put_u32_le(bytes.len() as u32);
    out.put_slice(bytes);
}

fn decode_bytes(buf: &mut BytesMut) -> Result<Vec<u8>, CoreError> {
    require(buf.len() >= 4, "truncated length prefix")?;
    let len = buf.get_u32_le() as usize;
    require(buf.len() >= len, "truncated byte payload")?;
    Ok(buf.split_to(len).to_vec())
}

fn require(condition: bool, message: &str) -> Result<(), CoreError> {
    if condition {
        Ok(())
    } else {
        Err(CoreError::new(codes::PROTOCOL_ERROR, message.to_string()))
    }
}

fn codec_error(message: &str) -> CoreError {
    CoreError::new(codes::PROTOCOL_ERROR, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::descriptor::TypeDescriptor;

    #[test]
    fn int_round_trips() {
        let value = Value::set_int(32, -7).unwrap();
        let mut buf = BytesMut::new();
        encode_value(&value, &mut buf).unwrap();
        let decoded = decode_value(&TypeDescriptor::int(true, 32), &mut buf).unwrap();
        assert_eq!(decoded.to_int().unwrap(), -7);
    }

    #[test]
    fn string_round_trips() {
        let value = Value::set_string("hello");
        let mut buf = BytesMut::new();
        encode_value(&value, &mut buf).unwrap();
        let decoded = decode_value(&TypeDescriptor::string(), &mut buf).unwrap();
        assert_eq!(decoded.to_str().unwrap(), "hello");
    }

    #[test]
    fn list_of_ints_round_trips() {
        let elements = vec![Value::set_int(32, 1).unwrap(), Value::set_int(32, 2).unwrap()];
        let descriptor = TypeDescriptor::list(TypeDescriptor::int(true, 32));
        let value = Value::new_owning(descriptor.clone(), Storage::List(Arc::new(elements)));
        let mut buf = BytesMut::new();
        encode_value(&value, &mut buf).unwrap();
        let decoded = decode_value(&descriptor, &mut buf).unwrap();
        let items = decoded.as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].to_int().unwrap(), 2);
    }

    #[test]
    fn truncated_payload_is_a_protocol_error() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(1);
        let err = decode_value(&TypeDescriptor::int(true, 32), &mut buf).unwrap_err();
        assert_eq!(err.code(), codes::PROTOCOL_ERROR);
    }

    #[test]
    fn type_signature_is_compact_and_stable() {
        let descriptor = TypeDescriptor::list(TypeDescriptor::int(true, 32));
        assert_eq!(type_signature(&descriptor), "[i32]");
    }
}

//! `TypeDescriptor`: the runtime record describing a value's kind, shape and
//! cross-registry equivalence key (`spec.md` §3 TypeDescriptor, §9 "Dynamic
//! dispatch without inheritance trees").
//!
//! The descriptor hierarchy is a closed sum indexed by [`Kind`], represented
//! here as a tagged union (`Shape`) rather than a class tree, per the design
//! notes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::meta::object::ObjectMeta;

/// The closed set of runtime kinds a [`TypeDescriptor`] can describe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Void,
    Int,
    Float,
    String,
    List,
    Map,
    Tuple,
    Pointer,
    Object,
    Dynamic,
    Raw,
    Iterator,
    Unknown,
}

/// Stable fingerprint used as an equivalence key across registry instances.
/// Two descriptors with equal `TypeInfo` are interchangeable (`spec.md` §3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeInfo(u64);

impl TypeInfo {
    fn from_hash<H: Hash>(seed: u64, value: &H) -> Self {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        value.hash(&mut hasher);
        TypeInfo(hasher.finish())
    }
}

/// Describes how a base-object relationship is realized for rule 10 of the
/// conversion engine (object inheritance offset). In this implementation
/// objects are addressed by [`crate::meta::object::ObjectId`] rather than by
/// raw memory layout, so `offset` is carried only for API fidelity with the
/// source design and is always `0`; see `DESIGN.md`.
#[derive(Clone, Debug)]
pub struct Inherits {
    pub base: Arc<TypeDescriptor>,
    pub offset: usize,
}

/// Kind-specific sub-descriptors (`spec.md` §3: "element type for List and
/// Pointer; key+element for Map; ordered member types for Tuple;
/// method/signal/property tables for Object; signedness+width for Int").
#[derive(Clone, Debug)]
pub enum Shape {
    Scalar,
    Int { signed: bool, width: u8 },
    Float { width: u8 },
    List { element: Arc<TypeDescriptor> },
    Map { key: Arc<TypeDescriptor>, value: Arc<TypeDescriptor> },
    Tuple { members: Vec<Arc<TypeDescriptor>> },
    Pointer { pointee: Arc<TypeDescriptor> },
    Object { meta: Arc<ObjectMeta>, inherits: Option<Inherits> },
    Iterator { element: Arc<TypeDescriptor> },
}

/// Immutable runtime record describing a type. `Kind` never changes after
/// construction; all kind-specific accessors the conversion engine needs
/// (§4.C) are total over the matching `Shape` variant.
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    kind: Kind,
    type_info: TypeInfo,
    shape: Shape,
}

impl TypeDescriptor {
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, Kind::Unknown)
    }

    /// Sentinel "no value" descriptor.
    pub fn null() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            kind: Kind::Unknown,
            type_info: TypeInfo(0),
            shape: Shape::Scalar,
        })
    }

    pub fn void() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            kind: Kind::Void,
            type_info: TypeInfo::from_hash(Kind::Void as u64, &"void"),
            shape: Shape::Scalar,
        })
    }

    pub fn int(signed: bool, width: u8) -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            kind: Kind::Int,
            type_info: TypeInfo::from_hash(Kind::Int as u64, &(signed, width)),
            shape: Shape::Int { signed, width },
        })
    }

    pub fn float(width: u8) -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            kind: Kind::Float,
            type_info: TypeInfo::from_hash(Kind::Float as u64, &width),
            shape: Shape::Float { width },
        })
    }

    pub fn string() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            kind: Kind::String,
            type_info: TypeInfo::from_hash(Kind::String as u64, &"string"),
            shape: Shape::Scalar,
        })
    }

    pub fn raw() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            kind: Kind::Raw,
            type_info: TypeInfo::from_hash(Kind::Raw as u64, &"raw"),
            shape: Shape::Scalar,
        })
    }

    pub fn dynamic() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor {
            kind: Kind::Dynamic,
            type_info: TypeInfo::from_hash(Kind::Dynamic as u64, &"dynamic"),
            shape: Shape::Scalar,
        })
    }

    pub fn list(element: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let type_info = TypeInfo::from_hash(Kind::List as u64, &element.type_info());
        Arc::new(TypeDescriptor {
            kind: Kind::List,
            type_info,
            shape: Shape::List { element },
        })
    }

    pub fn map(key: Arc<TypeDescriptor>, value: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let type_info = TypeInfo::from_hash(Kind::Map as u64, &(key.type_info(), value.type_info()));
        Arc::new(TypeDescriptor {
            kind: Kind::Map,
            type_info,
            shape: Shape::Map { key, value },
        })
    }

    pub fn tuple(members: Vec<Arc<TypeDescriptor>>) -> Arc<TypeDescriptor> {
        let infos: Vec<TypeInfo> = members.iter().map(|m| m.type_info()).collect();
        let type_info = TypeInfo::from_hash(Kind::Tuple as u64, &infos);
        Arc::new(TypeDescriptor {
            kind: Kind::Tuple,
            type_info,
            shape: Shape::Tuple { members },
        })
    }

    pub fn pointer(pointee: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let type_info = TypeInfo::from_hash(Kind::Pointer as u64, &pointee.type_info());
        Arc::new(TypeDescriptor {
            kind: Kind::Pointer,
            type_info,
            shape: Shape::Pointer { pointee },
        })
    }

    pub fn iterator(element: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let type_info = TypeInfo::from_hash(Kind::Iterator as u64, &element.type_info());
        Arc::new(TypeDescriptor {
            kind: Kind::Iterator,
            type_info,
            shape: Shape::Iterator { element },
        })
    }

    pub fn object(meta: Arc<ObjectMeta>, inherits: Option<Inherits>) -> Arc<TypeDescriptor> {
        let type_info = TypeInfo::from_hash(Kind::Object as u64, &(meta.name().to_string()));
        Arc::new(TypeDescriptor {
            kind: Kind::Object,
            type_info,
            shape: Shape::Object { meta, inherits },
        })
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_info == other.type_info
    }
}
impl Eq for TypeDescriptor {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_type_info_implies_interchangeable() {
        let a = TypeDescriptor::int(true, 32);
        let b = TypeDescriptor::int(true, 32);
        assert_eq!(a.type_info(), b.type_info());
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_width_yields_distinct_type_info() {
        let a = TypeDescriptor::int(true, 32);
        let b = TypeDescriptor::int(true, 64);
        assert_ne!(a.type_info(), b.type_info());
    }

    #[test]
    fn null_descriptor_is_the_unknown_kind() {
        let null = TypeDescriptor::null();
        assert!(null.is_null());
        assert_eq!(null.kind(), Kind::Unknown);
    }

    #[test]
    fn list_type_info_depends_on_element() {
        let ints = TypeDescriptor::list(TypeDescriptor::int(true, 32));
        let strs = TypeDescriptor::list(TypeDescriptor::string());
        assert_ne!(ints.type_info(), strs.type_info());
    }
}

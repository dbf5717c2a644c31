//! `Value`: a pair (descriptor, storage handle) with explicit ownership
//! (`spec.md` §3 Value, §4.B Value carrier).
//!
//! Storage is backed by `Arc` internally so cloning is O(1) and values are
//! `Send + Sync`; the `owning` flag tracks the *logical* ownership the spec
//! requires (see `DESIGN.md` for why this sidesteps the source's manual
//! destroy bookkeeping instead of reimplementing it).

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use super::descriptor::{Kind, Shape, TypeDescriptor};
use super::registry::{type_of, Reflect};
use crate::error::{codes, CoreError, ErrorCategory};
use crate::meta::object::ObjectId;

/// Backing storage for a [`Value`]. Every variant is cheap to clone (`Arc`
/// or `Copy`), which is what lets [`Value::clone_value`] always return an
/// owning value without a deep-copy pass.
#[derive(Clone)]
pub enum Storage {
    Void,
    /// Two's-complement bit pattern; the descriptor's `signed`/`width` pick
    /// how it is interpreted and re-validated on narrowing (`spec.md` §4.C
    /// rule 3, Int -> Int).
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    /// Insertion-ordered key/value pairs; map descriptors that need a
    /// different canonical order re-sort during conversion (§4.C rule 3).
    Map(Arc<Vec<(Value, Value)>>),
    Tuple(Arc<Vec<Value>>),
    Pointer(Arc<Value>),
    Object(ObjectId),
    Dynamic(Arc<Value>),
    Raw(Arc<[u8]>),
    Iterator(Arc<IteratorState>),
}

/// Forward-only cursor over a List or Map value (`spec.md` §3 Iterator).
pub struct IteratorState {
    elements: Arc<Vec<Value>>,
    position: Mutex<usize>,
}

impl IteratorState {
    pub fn over_list(elements: Arc<Vec<Value>>) -> Self {
        Self {
            elements,
            position: Mutex::new(0),
        }
    }

    /// Advances and returns the next element, or `None` at the sentinel end.
    pub fn advance(&self) -> Option<Value> {
        let mut position = self.position.lock();
        let item = self.elements.get(*position).cloned();
        if item.is_some() {
            *position += 1;
        }
        item
    }

    fn identity_eq(&self, other: &IteratorState) -> bool {
        Arc::ptr_eq(&self.elements, &other.elements) && *self.position.lock() == *other.position.lock()
    }
}

/// A (descriptor, storage) pair. `owning == true` means this `Value` is the
/// logical owner of its storage (the caller of a conversion with
/// `mustDestroy = true` gets one of these); `owning == false` marks a
/// borrowing value that must be cloned (via [`Value::clone_value`]) before
/// whatever it references might be dropped.
#[derive(Clone)]
pub struct Value {
    descriptor: Arc<TypeDescriptor>,
    storage: Storage,
    owning: bool,
}

impl Value {
    pub fn new_owning(descriptor: Arc<TypeDescriptor>, storage: Storage) -> Self {
        Self {
            descriptor,
            storage,
            owning: true,
        }
    }

    pub fn new_borrowing(descriptor: Arc<TypeDescriptor>, storage: Storage) -> Self {
        Self {
            descriptor,
            storage,
            owning: false,
        }
    }

    /// The sentinel "no value" (`spec.md` §3: "a null descriptor implies a
    /// null storage").
    pub fn null() -> Self {
        Self {
            descriptor: TypeDescriptor::null(),
            storage: Storage::Void,
            owning: false,
        }
    }

    pub fn void() -> Self {
        Self::new_owning(TypeDescriptor::void(), Storage::Void)
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn is_owning(&self) -> bool {
        self.owning
    }

    pub fn kind(&self) -> Kind {
        self.descriptor.kind()
    }

    /// Cloning a `Value` always produces an owning value (`spec.md` §4.B).
    /// A borrowed value must be cloned before its referent goes out of
    /// scope.
    pub fn clone_value(&self) -> Value {
        Value {
            descriptor: self.descriptor.clone(),
            storage: self.storage.clone(),
            owning: true,
        }
    }

    /// Used internally by the conversion engine's borrowing-result rules
    /// (identity short-circuit, `TypeInfo` fallback, inheritance offset):
    /// shares the same storage without claiming ownership of it.
    pub(crate) fn clone_value_borrowed(&self) -> Value {
        Value {
            descriptor: self.descriptor.clone(),
            storage: self.storage.clone(),
            owning: false,
        }
    }

    /// Explicit teardown of owning storage; a no-op on borrowing and null
    /// values. In this implementation `Value`'s fields are plain owned Rust
    /// data, so `destroy` consuming `self` and letting it drop *is* the
    /// teardown -- Rust's move checker rejects calling it twice on the same
    /// binding at compile time, which is the idiomatic realization of the
    /// source's "double-destroy is rejected" invariant (see `DESIGN.md`).
    pub fn destroy(self) {
        drop(self);
    }

    pub fn size(&self) -> Option<usize> {
        match &self.storage {
            Storage::List(items) => Some(items.len()),
            Storage::Map(items) => Some(items.len()),
            Storage::Tuple(items) => Some(items.len()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Arc<Vec<Value>>> {
        match &self.storage {
            Storage::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Arc<Vec<(Value, Value)>>> {
        match &self.storage {
            Storage::Map(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Arc<Vec<Value>>> {
        match &self.storage {
            Storage::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn begin_iterator(&self) -> Option<Value> {
        let elements = match &self.storage {
            Storage::List(items) => items.clone(),
            Storage::Map(items) => Arc::new(
                items
                    .iter()
                    .map(|(k, v)| Value::new_owning(TypeDescriptor::tuple(vec![k.descriptor.clone(), v.descriptor.clone()]), Storage::Tuple(Arc::new(vec![k.clone_value(), v.clone_value()]))))
                    .collect(),
            ),
            _ => return None,
        };
        let element_descriptor = match self.descriptor.shape() {
            Shape::List { element } => element.clone(),
            Shape::Map { key, value } => TypeDescriptor::tuple(vec![key.clone(), value.clone()]),
            _ => return None,
        };
        Some(Value::new_owning(
            TypeDescriptor::iterator(element_descriptor),
            Storage::Iterator(Arc::new(IteratorState::over_list(elements))),
        ))
    }

    pub fn iterator_advance(&self) -> Option<Value> {
        match &self.storage {
            Storage::Iterator(state) => state.advance(),
            _ => None,
        }
    }

    // -- typed setters (overflow-checked narrowing per spec.md §4.B) --

    pub fn set_int(width: u8, value: i64) -> Result<Value, CoreError> {
        check_int_range(true, width, value)?;
        Ok(Value::new_owning(TypeDescriptor::int(true, width), Storage::Int(value)))
    }

    pub fn set_uint(width: u8, value: u64) -> Result<Value, CoreError> {
        check_uint_range(width, value)?;
        Ok(Value::new_owning(TypeDescriptor::int(false, width), Storage::Int(value as i64)))
    }

    pub fn set_double(width: u8, value: f64) -> Value {
        let stored = if width == 32 { value as f32 as f64 } else { value };
        Value::new_owning(TypeDescriptor::float(width), Storage::Float(stored))
    }

    pub fn set_string(value: impl Into<Arc<str>>) -> Value {
        Value::new_owning(TypeDescriptor::string(), Storage::Str(value.into()))
    }

    // -- typed readers; throw (spec.md §7: "programmer-facing misuse") --

    pub fn to_int(&self) -> Result<i64, CoreError> {
        match (&self.storage, self.descriptor.shape()) {
            (Storage::Int(bits), Shape::Int { signed: true, .. }) => Ok(*bits),
            (Storage::Int(bits), Shape::Int { signed: false, width }) => {
                let mask = if *width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
                Ok((*bits as u64 & mask) as i64)
            }
            _ => Err(type_misuse("to_int", self.kind())),
        }
    }

    pub fn to_uint(&self) -> Result<u64, CoreError> {
        match &self.storage {
            Storage::Int(bits) => Ok(*bits as u64),
            _ => Err(type_misuse("to_uint", self.kind())),
        }
    }

    pub fn to_double(&self) -> Result<f64, CoreError> {
        match &self.storage {
            Storage::Float(v) => Ok(*v),
            _ => Err(type_misuse("to_double", self.kind())),
        }
    }

    pub fn to_str(&self) -> Result<&str, CoreError> {
        match &self.storage {
            Storage::Str(s) => Ok(s),
            _ => Err(type_misuse("to_string", self.kind())),
        }
    }

    pub fn to_tuple(&self) -> Result<&Arc<Vec<Value>>, CoreError> {
        self.as_tuple().ok_or_else(|| type_misuse("to_tuple", self.kind()))
    }

    pub fn to_object(&self) -> Result<ObjectId, CoreError> {
        match &self.storage {
            Storage::Object(id) => Ok(*id),
            _ => Err(type_misuse("to_object", self.kind())),
        }
    }
}

fn type_misuse(op: &'static str, kind: Kind) -> CoreError {
    CoreError::new(codes::INTERNAL, format!("{op} called on a {kind:?} value"))
        .with_category(ErrorCategory::Fatal)
}

fn check_int_range(signed: bool, width: u8, value: i64) -> Result<(), CoreError> {
    if width >= 64 {
        return Ok(());
    }
    let (min, max) = if signed {
        (-(1i64 << (width - 1)), (1i64 << (width - 1)) - 1)
    } else {
        (0, (1i64 << width) - 1)
    };
    if value < min || value > max {
        return Err(CoreError::new(codes::OVERFLOW, format!("{value} does not fit in {width}-bit {}", if signed { "signed" } else { "unsigned" })));
    }
    Ok(())
}

fn check_uint_range(width: u8, value: u64) -> Result<(), CoreError> {
    if width >= 64 {
        return Ok(());
    }
    let max = (1u64 << width) - 1;
    if value > max {
        return Err(CoreError::new(codes::OVERFLOW, format!("{value} does not fit in {width}-bit unsigned")));
    }
    Ok(())
}

/// `a == b ≡ !(a<b) && !(b<a)`, except iterators which use identity
/// (`spec.md` §4.B).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if let (Storage::Iterator(a), Storage::Iterator(b)) = (&self.storage, &other.storage) {
            return a.identity_eq(b);
        }
        !matches!(compare(self, other), Ordering::Less) && !matches!(compare(other, self), Ordering::Less)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(compare(self, other))
    }
}

fn kind_rank(kind: Kind) -> u8 {
    match kind {
        Kind::Unknown => 0,
        Kind::Void => 1,
        Kind::Int => 2,
        Kind::Float => 3,
        Kind::String => 4,
        Kind::Raw => 5,
        Kind::List => 6,
        Kind::Map => 7,
        Kind::Tuple => 8,
        Kind::Pointer => 9,
        Kind::Object => 10,
        Kind::Dynamic => 11,
        Kind::Iterator => 12,
    }
}

/// Total ordering used by value-keyed containers (`spec.md` §4.C "Total
/// ordering `<`"): null-first, numeric cross-kind compare for Int/Float,
/// memcmp-style for String (shorter is less on a tie), lexicographic for
/// List/Map, and an opaque-but-total ordering for Object/Pointer/Tuple/
/// Dynamic/Raw.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    if a.descriptor.is_null() && b.descriptor.is_null() {
        return Ordering::Equal;
    }
    if a.descriptor.is_null() {
        return Ordering::Less;
    }
    if b.descriptor.is_null() {
        return Ordering::Greater;
    }

    // Numeric cross-kind comparison is defined even when kinds differ.
    if matches!(a.kind(), Kind::Int | Kind::Float) && matches!(b.kind(), Kind::Int | Kind::Float) {
        let av = numeric_value(a);
        let bv = numeric_value(b);
        return av.partial_cmp(&bv).unwrap_or(Ordering::Equal);
    }

    if a.kind() != b.kind() {
        return kind_rank(a.kind()).cmp(&kind_rank(b.kind()));
    }

    match (&a.storage, &b.storage) {
        (Storage::Str(x), Storage::Str(y)) => match x.len().cmp(&y.len()) {
            Ordering::Equal => x.as_bytes().cmp(y.as_bytes()),
            other => other,
        },
        (Storage::List(x), Storage::List(y)) => match x.len().cmp(&y.len()) {
            Ordering::Equal => {
                for (xi, yi) in x.iter().zip(y.iter()) {
                    match compare(xi, yi) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                Ordering::Equal
            }
            other => other,
        },
        (Storage::Map(x), Storage::Map(y)) => match x.len().cmp(&y.len()) {
            Ordering::Equal => {
                for ((xk, xv), (yk, yv)) in x.iter().zip(y.iter()) {
                    match compare(xk, yk).then_with(|| compare(xv, yv)) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                Ordering::Equal
            }
            other => other,
        },
        (Storage::Object(x), Storage::Object(y)) => x.as_u64().cmp(&y.as_u64()),
        // Tuple/Pointer/Dynamic/Raw order by identity (the backing Arc's
        // address), not content: total, but deliberately not meaningful
        // across distinct values that happen to hold equal contents.
        (Storage::Tuple(x), Storage::Tuple(y)) => opaque_identity(Arc::as_ptr(x)).cmp(&opaque_identity(Arc::as_ptr(y))),
        (Storage::Pointer(x), Storage::Pointer(y)) => opaque_identity(Arc::as_ptr(x)).cmp(&opaque_identity(Arc::as_ptr(y))),
        (Storage::Dynamic(x), Storage::Dynamic(y)) => opaque_identity(Arc::as_ptr(x)).cmp(&opaque_identity(Arc::as_ptr(y))),
        (Storage::Raw(x), Storage::Raw(y)) => {
            opaque_identity(Arc::as_ptr(x) as *const u8).cmp(&opaque_identity(Arc::as_ptr(y) as *const u8))
        }
        _ => Ordering::Equal,
    }
}

fn opaque_identity<T>(ptr: *const T) -> usize {
    ptr as usize
}

fn numeric_value(v: &Value) -> f64 {
    match &v.storage {
        Storage::Int(bits) => match v.descriptor.shape() {
            Shape::Int { signed: true, .. } => *bits as f64,
            Shape::Int { signed: false, width } => {
                let mask = if *width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
                (*bits as u64 & mask) as f64
            }
            _ => *bits as f64,
        },
        Storage::Float(f) => *f,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_value_is_always_owning() {
        let borrowed = Value::new_borrowing(TypeDescriptor::int(true, 32), Storage::Int(7));
        assert!(!borrowed.is_owning());
        let cloned = borrowed.clone_value();
        assert!(cloned.is_owning());
    }

    #[test]
    fn total_order_holds_exactly_one_relation() {
        let a = Value::set_int(32, 1).unwrap();
        let b = Value::set_int(32, 2).unwrap();
        let lt = a < b;
        let gt = b < a;
        let eq = a == b;
        assert_eq!([lt, gt, eq].iter().filter(|x| **x).count(), 1);
    }

    #[test]
    fn narrowing_int_overflow_is_rejected() {
        let huge = 1i64 << 40;
        assert!(Value::set_int(32, huge).is_err());
    }

    #[test]
    fn string_ordering_prefers_shorter_on_tie() {
        let short = Value::set_string("ab");
        let long = Value::set_string("abc");
        assert!(compare(&short, &long) == Ordering::Less);
    }

    #[test]
    fn destroy_consumes_the_value() {
        let v = Value::void();
        v.destroy();
    }

    #[test]
    fn numeric_cross_kind_compare_is_numeric() {
        let i = Value::set_int(32, 4).unwrap();
        let f = Value::set_double(64, 4.0);
        assert!(i == f);
    }

    #[test]
    fn raw_values_order_by_identity_not_content() {
        let a = Value::new_owning(TypeDescriptor::raw(), Storage::Raw(Arc::from(&b"same"[..])));
        let b = Value::new_owning(TypeDescriptor::raw(), Storage::Raw(Arc::from(&b"same"[..])));
        assert_ne!(compare(&a, &b), Ordering::Equal, "distinct Arcs with equal bytes are not equal under identity ordering");
        assert_eq!(compare(&a, &a), Ordering::Equal, "a value always compares equal to itself");
    }

    #[test]
    fn tuple_values_order_by_identity_not_content() {
        let a = Value::new_owning(TypeDescriptor::tuple(vec![]), Storage::Tuple(Arc::new(vec![Value::set_int(32, 1).unwrap()])));
        let b = Value::new_owning(TypeDescriptor::tuple(vec![]), Storage::Tuple(Arc::new(vec![Value::set_int(32, 1).unwrap()])));
        assert_ne!(compare(&a, &b), Ordering::Equal, "distinct Arcs with equal elements are not equal under identity ordering");
    }
}

//! Process-wide type registry (`spec.md` §4.A).
//!
//! The only module with process-wide mutable state: a lazily-populated
//! `TypeId -> TypeDescriptor` table. First touch wins; descriptors are
//! never destroyed, matching the design notes ("initialize lazily behind a
//! once-gate; never destroy").

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::descriptor::TypeDescriptor;

static REGISTRY: OnceLock<DashMap<TypeId, Arc<TypeDescriptor>>> = OnceLock::new();

fn registry() -> &'static DashMap<TypeId, Arc<TypeDescriptor>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Implemented by every static Rust type the runtime can carry inside a
/// [`super::value::Value`]. `describe()` is called at most once per type per
/// process (see [`type_of`]).
pub trait Reflect: Any {
    fn describe() -> Arc<TypeDescriptor>;
}

/// `typeOf<T>()`: returns the descriptor registered for `T`, constructing
/// one on first call. Idempotent and thread-safe by construction (DashMap's
/// shard locks + `entry` API never produce two live descriptors for the
/// same `TypeId`).
pub fn type_of<T: Reflect>() -> Arc<TypeDescriptor> {
    let id = TypeId::of::<T>();
    if let Some(existing) = registry().get(&id) {
        return existing.clone();
    }
    let descriptor = T::describe();
    registry()
        .entry(id)
        .or_insert_with(|| descriptor)
        .clone()
}

/// Number of distinct types registered so far. Exposed for tests/diagnostics
/// only; not part of the stable contract.
pub fn registered_count() -> usize {
    REGISTRY.get().map(|r| r.len()).unwrap_or(0)
}

macro_rules! reflect_int {
    ($ty:ty, $signed:expr, $width:expr) => {
        impl Reflect for $ty {
            fn describe() -> Arc<TypeDescriptor> {
                TypeDescriptor::int($signed, $width)
            }
        }
    };
}

reflect_int!(i8, true, 8);
reflect_int!(i16, true, 16);
reflect_int!(i32, true, 32);
reflect_int!(i64, true, 64);
reflect_int!(u8, false, 8);
reflect_int!(u16, false, 16);
reflect_int!(u32, false, 32);
reflect_int!(u64, false, 64);

impl Reflect for bool {
    fn describe() -> Arc<TypeDescriptor> {
        TypeDescriptor::int(false, 1)
    }
}

impl Reflect for f32 {
    fn describe() -> Arc<TypeDescriptor> {
        TypeDescriptor::float(32)
    }
}

impl Reflect for f64 {
    fn describe() -> Arc<TypeDescriptor> {
        TypeDescriptor::float(64)
    }
}

impl Reflect for String {
    fn describe() -> Arc<TypeDescriptor> {
        TypeDescriptor::string()
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn describe() -> Arc<TypeDescriptor> {
        TypeDescriptor::list(type_of::<T>())
    }
}

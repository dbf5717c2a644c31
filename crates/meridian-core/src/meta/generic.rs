//! Generic function adapter (`spec.md` §4.E): packs/unpacks a heterogeneous
//! argument vector into a statically-typed callable.

use std::sync::Arc;

use crate::error::{codes, CoreError};
use crate::types::descriptor::TypeDescriptor;
use crate::types::registry::{type_of, Reflect};
use crate::types::value::Value;

/// A type-erased, statically-typed callable `R(A1, ..., An)` wrapped for
/// dispatch: at wrap time the descriptors for `R` and each `Ai` are
/// recorded; at call time each provided storage is re-cast into the
/// expected argument type with **no conversion** -- callers are expected to
/// have already routed mismatched shapes through the conversion engine
/// (§4.C).
#[derive(Clone)]
pub struct GenericFunction {
    return_descriptor: Arc<TypeDescriptor>,
    arg_descriptors: Vec<Arc<TypeDescriptor>>,
    call: Arc<dyn Fn(&[Value]) -> Result<Value, CoreError> + Send + Sync>,
}

impl GenericFunction {
    pub fn new(
        return_descriptor: Arc<TypeDescriptor>,
        arg_descriptors: Vec<Arc<TypeDescriptor>>,
        call: impl Fn(&[Value]) -> Result<Value, CoreError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            return_descriptor,
            arg_descriptors,
            call: Arc::new(call),
        }
    }

    pub fn return_descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.return_descriptor
    }

    pub fn arg_descriptors(&self) -> &[Arc<TypeDescriptor>] {
        &self.arg_descriptors
    }

    pub fn call(&self, storages: &[Value]) -> Result<Value, CoreError> {
        if storages.len() != self.arg_descriptors.len() {
            return Err(CoreError::new(
                codes::PROTOCOL_ERROR,
                format!(
                    "argument count mismatch: expected {}, got {}",
                    self.arg_descriptors.len(),
                    storages.len()
                ),
            ));
        }
        for (provided, expected) in storages.iter().zip(self.arg_descriptors.iter()) {
            if provided.descriptor().type_info() != expected.type_info() {
                return Err(CoreError::new(
                    codes::PROTOCOL_ERROR,
                    "argument shape mismatch; caller must convert before calling",
                ));
            }
        }
        (self.call)(storages)
    }

    /// Bound-instance variant: pre-binds `this` to the head of the argument
    /// list before invocation (`spec.md` §4.E).
    pub fn bind(self, this: Value) -> GenericFunction {
        let mut arg_descriptors = Vec::with_capacity(self.arg_descriptors.len() + 1);
        arg_descriptors.push(this.descriptor().clone());
        arg_descriptors.extend(self.arg_descriptors.iter().cloned());
        let inner = self.call.clone();
        let return_descriptor = self.return_descriptor.clone();
        GenericFunction {
            return_descriptor,
            arg_descriptors,
            call: Arc::new(move |storages: &[Value]| {
                let mut full = Vec::with_capacity(storages.len() + 1);
                full.push(this.clone_value());
                full.extend_from_slice(storages);
                inner(&full)
            }),
        }
    }
}

/// Exact (no-conversion) extraction of a native Rust value out of a
/// [`Value`]; used by [`wrap1`]/[`wrap2`] to build [`GenericFunction`]s from
/// ordinary Rust closures.
pub trait FromValueExact: Sized + Reflect {
    fn from_value_exact(value: &Value) -> Result<Self, CoreError>;
}

/// Packs a native Rust value back into a dynamic [`Value`].
pub trait IntoValue: Reflect {
    fn into_value(self) -> Value;
}

macro_rules! impl_exact_int {
    ($ty:ty, $signed:expr, $width:expr) => {
        impl FromValueExact for $ty {
            fn from_value_exact(value: &Value) -> Result<Self, CoreError> {
                if $signed {
                    value.to_int().map(|v| v as $ty)
                } else {
                    value.to_uint().map(|v| v as $ty)
                }
            }
        }

        impl IntoValue for $ty {
            fn into_value(self) -> Value {
                if $signed {
                    Value::set_int($width, self as i64).expect("native width always fits")
                } else {
                    Value::set_uint($width, self as u64).expect("native width always fits")
                }
            }
        }
    };
}

impl_exact_int!(i8, true, 8);
impl_exact_int!(i16, true, 16);
impl_exact_int!(i32, true, 32);
impl_exact_int!(i64, true, 64);
impl_exact_int!(u8, false, 8);
impl_exact_int!(u16, false, 16);
impl_exact_int!(u32, false, 32);
impl_exact_int!(u64, false, 64);

impl FromValueExact for f64 {
    fn from_value_exact(value: &Value) -> Result<Self, CoreError> {
        value.to_double()
    }
}
impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::set_double(64, self)
    }
}

impl FromValueExact for String {
    fn from_value_exact(value: &Value) -> Result<Self, CoreError> {
        value.to_str().map(str::to_owned)
    }
}
impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::set_string(self)
    }
}

/// Wraps a zero-argument callable.
pub fn wrap0<R: IntoValue>(f: impl Fn() -> R + Send + Sync + 'static) -> GenericFunction {
    GenericFunction::new(type_of::<R>(), vec![], move |_args| Ok(f().into_value()))
}

/// Wraps a one-argument callable.
pub fn wrap1<A1: FromValueExact, R: IntoValue>(
    f: impl Fn(A1) -> R + Send + Sync + 'static,
) -> GenericFunction {
    GenericFunction::new(type_of::<R>(), vec![type_of::<A1>()], move |args| {
        let a1 = A1::from_value_exact(&args[0])?;
        Ok(f(a1).into_value())
    })
}

/// Wraps a two-argument callable.
pub fn wrap2<A1: FromValueExact, A2: FromValueExact, R: IntoValue>(
    f: impl Fn(A1, A2) -> R + Send + Sync + 'static,
) -> GenericFunction {
    GenericFunction::new(
        type_of::<R>(),
        vec![type_of::<A1>(), type_of::<A2>()],
        move |args| {
            let a1 = A1::from_value_exact(&args[0])?;
            let a2 = A2::from_value_exact(&args[1])?;
            Ok(f(a1, a2).into_value())
        },
    )
}

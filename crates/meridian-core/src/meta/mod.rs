//! Object meta-description: methods, signals, properties and the generic
//! function adapter that binds native Rust callables into the dynamic
//! dispatch surface (`spec.md` §3, §4.D, §4.E).

pub mod descriptor;
pub mod generic;
pub mod object;
pub mod signal;

pub use descriptor::{MetaMethod, MetaProperty, MetaSignal};
pub use generic::{GenericFunction, IntoValue};
pub use object::{ObjectId, ObjectMeta, ObjectRecord, ObjectRegistry};
pub use signal::{LinkId, Subscriber, SubscriberTable};

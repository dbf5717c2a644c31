//! Per-object meta-tables and the object arena (`spec.md` §3 MetaMethod /
//! MetaSignal / MetaProperty, §9 "Cyclic object graphs": objects are
//! addressed by an opaque [`ObjectId`], never by raw pointer, so service
//! graphs may freely reference each other without fighting the borrow
//! checker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::descriptor::{MetaMethod, MetaProperty, MetaSignal};
use crate::error::{codes, CoreError};

/// Opaque handle into an [`ObjectRegistry`]. Stable for the object's
/// lifetime; never reused, so a stale `ObjectId` reliably fails lookups
/// instead of aliasing a different object (`spec.md` §9 design notes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// The method/signal/property tables belonging to one object type, keyed by
/// stable integer id with secondary lookup by signature string (`spec.md`
/// §4.D).
#[derive(Debug, Default)]
pub struct ObjectMeta {
    name: String,
    methods: HashMap<u32, MetaMethod>,
    signals: HashMap<u32, MetaSignal>,
    properties: HashMap<u32, MetaProperty>,
    methods_by_signature: HashMap<String, u32>,
    signals_by_signature: HashMap<String, u32>,
    properties_by_signature: HashMap<String, u32>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a method. Id `0` is reserved and rejected (`spec.md` §3).
    pub fn add_method(&mut self, method: MetaMethod) -> Result<(), CoreError> {
        if method.id() == 0 {
            return Err(CoreError::new(codes::PROTOCOL_ERROR, "meta id 0 is reserved"));
        }
        self.methods_by_signature
            .insert(method.signature().to_string(), method.id());
        self.methods.insert(method.id(), method);
        Ok(())
    }

    pub fn add_signal(&mut self, signal: MetaSignal) -> Result<(), CoreError> {
        if signal.id() == 0 {
            return Err(CoreError::new(codes::PROTOCOL_ERROR, "meta id 0 is reserved"));
        }
        self.signals_by_signature
            .insert(signal.signature().to_string(), signal.id());
        self.signals.insert(signal.id(), signal);
        Ok(())
    }

    pub fn add_property(&mut self, property: MetaProperty) -> Result<(), CoreError> {
        if property.id() == 0 {
            return Err(CoreError::new(codes::PROTOCOL_ERROR, "meta id 0 is reserved"));
        }
        self.properties_by_signature
            .insert(property.signature().to_string(), property.id());
        self.properties.insert(property.id(), property);
        Ok(())
    }

    pub fn method(&self, id: u32) -> Option<&MetaMethod> {
        self.methods.get(&id)
    }

    pub fn method_mut(&mut self, id: u32) -> Option<&mut MetaMethod> {
        self.methods.get_mut(&id)
    }

    pub fn signal(&self, id: u32) -> Option<&MetaSignal> {
        self.signals.get(&id)
    }

    pub fn signal_mut(&mut self, id: u32) -> Option<&mut MetaSignal> {
        self.signals.get_mut(&id)
    }

    pub fn property(&self, id: u32) -> Option<&MetaProperty> {
        self.properties.get(&id)
    }

    pub fn method_by_signature(&self, signature: &str) -> Option<&MetaMethod> {
        self.methods_by_signature
            .get(signature)
            .and_then(|id| self.methods.get(id))
    }

    pub fn signal_by_signature(&self, signature: &str) -> Option<&MetaSignal> {
        self.signals_by_signature
            .get(signature)
            .and_then(|id| self.signals.get(id))
    }
}

/// A live instance: its meta-table plus the dispatch target the framer
/// routes `Call`/`Post`/`Event` messages into (`spec.md` §4.H).
pub struct ObjectRecord {
    id: ObjectId,
    service_id: u32,
    meta: Arc<RwLock<ObjectMeta>>,
}

impl ObjectRecord {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn service_id(&self) -> u32 {
        self.service_id
    }

    pub fn meta(&self) -> &Arc<RwLock<ObjectMeta>> {
        &self.meta
    }
}

/// Arena of object records. Objects reference each other by [`ObjectId`],
/// never by pointer, so cyclic service graphs (`spec.md` §9) are expressible
/// without unsafe code or reference cycles.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<ObjectId, Arc<ObjectRecord>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service_id: u32, meta: ObjectMeta) -> Arc<ObjectRecord> {
        let id = ObjectId::next();
        let record = Arc::new(ObjectRecord {
            id,
            service_id,
            meta: Arc::new(RwLock::new(meta)),
        });
        self.objects.write().insert(id, record.clone());
        record
    }

    pub fn get(&self, id: ObjectId) -> Option<Arc<ObjectRecord>> {
        self.objects.read().get(&id).cloned()
    }

    pub fn remove(&self, id: ObjectId) -> Option<Arc<ObjectRecord>> {
        self.objects.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_never_reused() {
        let registry = ObjectRegistry::new();
        let a = registry.register(1, ObjectMeta::new("a"));
        registry.remove(a.id());
        let b = registry.register(1, ObjectMeta::new("b"));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn meta_id_zero_is_rejected() {
        let mut meta = ObjectMeta::new("svc");
        let method = MetaMethod::new(0, "bad::()");
        assert!(meta.add_method(method).is_err());
    }
}

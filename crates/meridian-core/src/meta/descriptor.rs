//! `MetaMethod` / `MetaSignal` / `MetaProperty` (`spec.md` §3, §4.D): stable
//! per-object ids with a secondary lookup by signature string.

use super::signal::SubscriberTable;

/// A callable member of an object's meta-table.
#[derive(Clone, Debug)]
pub struct MetaMethod {
    id: u32,
    signature: String,
}

impl MetaMethod {
    pub fn new(id: u32, signature: impl Into<String>) -> Self {
        Self {
            id,
            signature: signature.into(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// An event source with a live subscriber table (`spec.md` §3: "for signals
/// a list of current subscribers").
#[derive(Clone)]
pub struct MetaSignal {
    id: u32,
    signature: String,
    subscribers: SubscriberTable,
}

impl MetaSignal {
    pub fn new(id: u32, signature: impl Into<String>) -> Self {
        Self {
            id,
            signature: signature.into(),
            subscribers: SubscriberTable::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn subscribers(&self) -> &SubscriberTable {
        &self.subscribers
    }
}

/// A readable/writable attribute exposed through the meta-table.
#[derive(Clone)]
pub struct MetaProperty {
    id: u32,
    signature: String,
    /// Properties piggy-back on the signal machinery to notify watchers of
    /// changes, matching the source's "property change" signal convention.
    changed: SubscriberTable,
}

impl MetaProperty {
    pub fn new(id: u32, signature: impl Into<String>) -> Self {
        Self {
            id,
            signature: signature.into(),
            changed: SubscriberTable::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn changed(&self) -> &SubscriberTable {
        &self.changed
    }
}

//! Signal subscriber bookkeeping (`spec.md` §4.D, §5 "Signal subscriber list
//! race", §9 design notes): the list is guarded by a mutex only for the
//! duration of a membership change; emission takes a snapshot so user
//! callbacks never run while the lock is held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::generic::GenericFunction;
use super::object::ObjectId;
use crate::error::CoreError;
use crate::types::value::Value;

/// Opaque handle returned by [`SubscriberTable::connect`], accepted by
/// [`SubscriberTable::disconnect`]. Never reused within a table's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

/// Exactly one of: a local callable bound to a generic function adapter, or
/// a forwarding pair to another object's method (`spec.md` §3 MetaSignal).
#[derive(Clone)]
pub enum Subscriber {
    Local(Arc<GenericFunction>),
    Forward {
        target_object: ObjectId,
        target_method: u32,
    },
}

#[derive(Clone)]
struct Entry {
    link: LinkId,
    subscriber: Subscriber,
}

/// Append-stable subscriber list for one signal or property.
#[derive(Clone)]
pub struct SubscriberTable {
    entries: Arc<Mutex<Vec<Entry>>>,
    next_link: Arc<AtomicU64>,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_link: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers a subscriber and returns its `linkId`. Ids are handed out
    /// by a monotonic counter and never reused, so a stale `linkId` can
    /// never alias a newer subscription.
    pub fn connect(&self, subscriber: Subscriber) -> LinkId {
        let link = LinkId(self.next_link.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push(Entry { link, subscriber });
        link
    }

    /// Removes a subscriber immediately: the `linkId` becomes invalid for
    /// every emission that starts after this call returns. An emission
    /// already in flight completed its snapshot before this ran and is
    /// unaffected (deferred-removal semantics, `spec.md` §9).
    pub fn disconnect(&self, link: LinkId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.link != link);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronously delivers `args` to every subscriber that was connected
    /// at the moment the snapshot was taken, in subscription order. A
    /// dispatcher is supplied for `Forward` subscribers since following one
    /// requires routing into another object, which this module does not
    /// own. Errors from any one subscriber are logged and do not stop the
    /// remaining subscribers from running (`spec.md` §4.D).
    pub fn emit(
        &self,
        args: &[Value],
        forward: impl Fn(ObjectId, u32, &[Value]) -> Result<(), CoreError>,
    ) {
        let snapshot: Vec<Entry> = self.entries.lock().clone();
        for entry in snapshot {
            let result = match &entry.subscriber {
                Subscriber::Local(function) => function.call(args).map(|_| ()),
                Subscriber::Forward {
                    target_object,
                    target_method,
                } => forward(*target_object, *target_method, args),
            };
            if let Err(error) = result {
                warn!(target: "meridian_core::signal", %error, "subscriber raised an error; continuing to remaining subscribers");
            }
        }
    }
}

impl Default for SubscriberTable {
    fn default() -> Self {
        Self::new()
    }
}

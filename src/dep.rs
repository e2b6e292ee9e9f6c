use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use log::trace;
use crate::reactor::Reactor;
use crate::uid::{DepId, WatcherId};
use crate::watcher::{Watcher, WeakWatcher};

/// Subscriber registry for one reactive field, or for one container's structural marker.
///
/// Subscribers are keyed by [WatcherId], so a watcher is registered at most once and
/// notification order is creation order. Subscribers are held weakly: the watcher's owner
/// (or whoever created it) keeps it alive.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

struct DepInner {
    id: DepId,
    subs: RefCell<BTreeMap<WatcherId, WeakWatcher>>,
}

impl Dep {
    pub fn new() -> Self {
        Dep(Rc::new(DepInner {
            id: DepId::next(),
            subs: RefCell::new(BTreeMap::new()),
        }))
    }

    pub fn id(&self) -> DepId {
        self.0.id
    }

    pub(crate) fn add_sub(&self, sub: &Watcher) {
        self.0.subs.borrow_mut().insert(sub.id(), sub.downgrade());
    }

    pub(crate) fn remove_sub(&self, id: WatcherId) {
        self.0.subs.borrow_mut().remove(&id);
    }

    /// Record this dep as read by the active target, if there is one.
    pub fn depend(&self, rx: &Reactor) {
        if let Some(target) = rx.current_target() {
            target.add_dep(self);
        }
    }

    /// Tell every subscriber this dep changed, in ascending watcher id order.
    ///
    /// The subscriber list is snapshotted first: subscribers added or removed while notifying
    /// don't affect this round.
    pub fn notify(&self, rx: &Reactor) {
        let subs = self.0.subs.borrow().values().filter_map(WeakWatcher::upgrade).collect::<Vec<_>>();
        trace!("dep {:?} notifying {} subscriber(s)", self.0.id, subs.len());
        for sub in subs {
            sub.update(rx);
        }
    }

    /// Number of registered subscribers. Watchers leave the registry when torn down or
    /// dropped.
    pub fn subscriber_count(&self) -> usize {
        self.0.subs.borrow().len()
    }

    pub fn has_subscriber(&self, watcher: &Watcher) -> bool {
        self.0.subs.borrow().contains_key(&watcher.id())
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Dep {}

impl Debug for Dep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("subs", &self.0.subs.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

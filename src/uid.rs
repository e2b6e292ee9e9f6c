use std::cell::Cell;
use std::thread_local;

thread_local! {
    static DEP_UID: Cell<u64> = Cell::new(0);
    static WATCHER_UID: Cell<u64> = Cell::new(0);
    static CONTAINER_UID: Cell<u64> = Cell::new(0);
}

fn next(counter: &'static std::thread::LocalKey<Cell<u64>>) -> u64 {
    counter.with(|uid_cell| {
        let uid = uid_cell.get() + 1;
        uid_cell.set(uid);
        uid
    })
}

/// Identity of a [crate::Dep]. Monotonic within a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

/// Identity of a [crate::Watcher], also its evaluation order: watchers created earlier
/// have smaller ids and are flushed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(u64);

/// Identity of an [crate::Object] or [crate::List].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(u64);

impl DepId {
    pub(crate) fn next() -> DepId {
        DepId(next(&DEP_UID))
    }
}

impl WatcherId {
    pub(crate) fn next() -> WatcherId {
        WatcherId(next(&WATCHER_UID))
    }
}

impl ContainerId {
    pub(crate) fn next() -> ContainerId {
        ContainerId(next(&CONTAINER_UID))
    }
}

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use log::{error, trace};
use crate::error::{Error, Result};
use crate::reactor::Reactor;
use crate::uid::WatcherId;
use crate::watcher::Watcher;

type Tick = Box<dyn FnOnce(&Reactor)>;

/// Batched update queue. Lives in the [Reactor]; enqueue and flush are the only ways it's
/// mutated.
#[derive(Default)]
pub(crate) struct Scheduler {
    queue: RefCell<Vec<Watcher>>,
    has: RefCell<HashSet<WatcherId>>,
    circular: RefCell<HashMap<WatcherId, usize>>,
    waiting: Cell<bool>,
    flushing: Cell<bool>,
    index: Cell<usize>,
    ticks: RefCell<Vec<Tick>>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn reset(&self) {
        self.index.set(0);
        self.queue.borrow_mut().clear();
        self.has.borrow_mut().clear();
        self.circular.borrow_mut().clear();
        self.waiting.set(false);
        self.flushing.set(false);
    }
}

/// Queue `watcher` for the next flush. A watcher already queued (and not yet run) is not
/// queued twice. During a flush the watcher is spliced in by id, after the one running.
pub(crate) fn queue_watcher(rx: &Reactor, watcher: Watcher) {
    let scheduler = &rx.inner().scheduler;
    if !scheduler.has.borrow_mut().insert(watcher.id()) {
        return;
    }
    trace!("queued watcher {:?} \"{}\"", watcher.id(), watcher.expression());
    if !scheduler.flushing.get() {
        scheduler.queue.borrow_mut().push(watcher);
    } else {
        let mut queue = scheduler.queue.borrow_mut();
        let index = scheduler.index.get();
        let mut position = queue.len();
        while position > index + 1 && queue[position - 1].id() > watcher.id() {
            position -= 1;
        }
        queue.insert(position, watcher);
    }
    if !scheduler.waiting.get() {
        scheduler.waiting.set(true);
        if !rx.config().async_updates {
            if let Err(err) = rx.flush() {
                error!("synchronous flush aborted: {}", err);
                rx.handle_error(&anyhow::Error::new(err), None, "scheduler flush");
            }
        }
    }
}

impl Reactor {
    /// Run every queued watcher, in ascending id order, then the [Reactor::next_tick]
    /// callbacks.
    ///
    /// Watchers queued while flushing run in the same flush. Errors from watcher code never
    /// escape: they go to the error hook. The one exception is a watcher re-queued more than
    /// [crate::Config::max_update_count] times, which aborts the flush with
    /// [Error::InfiniteUpdateLoop] and drops the rest of the queue.
    ///
    /// Calling this from inside a flush does nothing.
    pub fn flush(&self) -> Result<()> {
        let scheduler = &self.inner().scheduler;
        if scheduler.flushing.get() {
            return Ok(());
        }
        scheduler.flushing.set(true);
        scheduler.queue.borrow_mut().sort_by_key(Watcher::id);
        scheduler.index.set(0);
        let result = self.run_queue();
        scheduler.reset();
        let ticks = std::mem::take(&mut *scheduler.ticks.borrow_mut());
        for tick in ticks {
            tick(self);
        }
        result
    }

    fn run_queue(&self) -> Result<()> {
        let scheduler = &self.inner().scheduler;
        loop {
            let index = scheduler.index.get();
            let next = scheduler.queue.borrow().get(index).cloned();
            let Some(watcher) = next else {
                break;
            };
            let id = watcher.id();
            scheduler.has.borrow_mut().remove(&id);
            trace!("flushing watcher {:?} \"{}\"", id, watcher.expression());
            if let Err(err) = watcher.run(self) {
                self.handle_error(&anyhow::Error::new(err), watcher.owner().as_ref(), "scheduler flush");
            }
            if scheduler.has.borrow().contains(&id) {
                let limit = self.config().max_update_count;
                let mut circular = scheduler.circular.borrow_mut();
                let count = circular.entry(id).or_insert(0);
                *count += 1;
                if *count > limit {
                    error!("infinite update loop in watcher \"{}\"", watcher.expression());
                    return Err(Error::InfiniteUpdateLoop {
                        expression: watcher.expression().to_owned(),
                        limit,
                    });
                }
            }
            scheduler.index.set(index + 1);
        }
        Ok(())
    }

    /// Run `tick` after the next flush. With synchronous updates (see
    /// [crate::Config::async_updates]) and nothing flushing, runs it right away.
    pub fn next_tick(&self, tick: impl FnOnce(&Reactor) + 'static) {
        let scheduler = &self.inner().scheduler;
        if !self.config().async_updates && !scheduler.flushing.get() {
            tick(self);
            return;
        }
        scheduler.ticks.borrow_mut().push(Box::new(tick));
    }

    /// Whether a flush has anything to do.
    pub fn is_flush_pending(&self) -> bool {
        let scheduler = &self.inner().scheduler;
        scheduler.waiting.get() || !scheduler.ticks.borrow().is_empty()
    }

    /// Number of watchers waiting for the next flush.
    pub fn queued_count(&self) -> usize {
        self.inner().scheduler.queue.borrow().len()
    }
}

impl Debug for Scheduler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue", &self.queue.borrow().iter().map(Watcher::id).collect::<Vec<_>>())
            .field("waiting", &self.waiting.get())
            .field("flushing", &self.flushing.get())
            .field("index", &self.index.get())
            .field("ticks", &self.ticks.borrow().len())
            .finish()
    }
}

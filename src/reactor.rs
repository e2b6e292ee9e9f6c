use std::cell::{Cell, RefCell};
use std::rc::Rc;
use derivative::Derivative;
use log::{error, warn};
use crate::config::Config;
use crate::instance::Instance;
use crate::scheduler::Scheduler;
use crate::watcher::Watcher;

/// The context every tracked read, write and evaluation goes through.
///
/// A reactor owns the state that the tracking subsystem shares:
///
/// - the *active target* stack: the watcher currently being evaluated is on top, and reads
///   performed through [crate::Object::get] are attributed to it. Nested evaluation (e.g.
///   reading a computed value while evaluating another watcher) pushes a new frame and
///   popping restores the enclosing one;
/// - the observe toggle, which disables recursive observation for scoped operations;
/// - the batched update queue (see [Reactor::flush]);
/// - the [Config], including the error and warning hooks.
///
/// Everything is single-threaded: a reactor is a cheap `Rc` handle you pass by reference
/// (`&rx`) into every operation, much like a context object. Containers and watchers aren't
/// bound to one reactor, but mixing reactors for one graph means each has its own queue.
#[derive(Debug, Clone)]
pub struct Reactor(Rc<ReactorInner>);

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct ReactorInner {
    config: Config,
    #[derivative(Debug = "ignore")]
    targets: RefCell<Vec<Option<Watcher>>>,
    should_observe: Cell<bool>,
    pub(crate) scheduler: Scheduler,
}

/// Keeps a frame on the active target stack. Dropping it pops the frame, so the enclosing
/// evaluator is restored on every exit path.
#[must_use = "the target is popped as soon as the guard is dropped"]
pub(crate) struct TargetGuard<'a> {
    rx: &'a Reactor,
    depth: usize,
}

/// Restores the observe toggle on drop.
struct ObservingGuard<'a> {
    rx: &'a Reactor,
    previous: bool,
}

impl Reactor {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Reactor(Rc::new(ReactorInner {
            config,
            targets: RefCell::new(Vec::new()),
            should_observe: Cell::new(true),
            scheduler: Scheduler::new(),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub(crate) fn inner(&self) -> &ReactorInner {
        &self.0
    }

    /// The watcher reads are currently attributed to, if any.
    pub fn current_target(&self) -> Option<Watcher> {
        self.0.targets.borrow().last().cloned().flatten()
    }

    pub fn has_target(&self) -> bool {
        matches!(self.0.targets.borrow().last(), Some(Some(_)))
    }

    pub(crate) fn push_target(&self, target: Option<Watcher>) -> TargetGuard<'_> {
        let mut targets = self.0.targets.borrow_mut();
        targets.push(target);
        TargetGuard { rx: self, depth: targets.len() }
    }

    /// Run `f` without attributing any read to the current target.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.push_target(None);
        f()
    }

    /// Enable or disable recursive observation. While disabled, [crate::observe] creates no
    /// new markers (already observed containers keep theirs).
    pub fn toggle_observing(&self, value: bool) {
        self.0.should_observe.set(value);
    }

    pub fn should_observe(&self) -> bool {
        self.0.should_observe.get()
    }

    /// Run `f` with observation disabled, restoring the previous setting afterwards (also
    /// when `f` panics).
    pub fn without_observing<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = ObservingGuard {
            rx: self,
            previous: self.0.should_observe.replace(false),
        };
        f()
    }

    /// Report a development-mode diagnostic through the warn hook.
    pub fn warn(&self, msg: &str, owner: Option<&Instance>) {
        let config = &self.0.config;
        if !config.warnings_enabled() {
            return;
        }
        match &config.warn_handler {
            Some(handler) => handler(msg, owner),
            None => match owner {
                Some(owner) => warn!("{} (found in <{}>)", msg, owner.name()),
                None => warn!("{}", msg),
            },
        }
    }

    /// Forward an error raised by user code to the error hook.
    pub fn handle_error(&self, err: &anyhow::Error, owner: Option<&Instance>, label: &str) {
        match &self.0.config.error_handler {
            Some(handler) => handler(err, owner, label),
            None => error!("Error in {}: {:#}", label, err),
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        let mut targets = self.rx.0.targets.borrow_mut();
        debug_assert_eq!(targets.len(), self.depth, "active target stack popped out of order");
        targets.pop();
    }
}

impl Drop for ObservingGuard<'_> {
    fn drop(&mut self) {
        self.rx.0.should_observe.set(self.previous);
    }
}

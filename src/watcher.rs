use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use derivative::Derivative;
use log::{debug, trace};
use crate::dep::Dep;
use crate::error::{Error, Result};
use crate::instance::{Instance, WeakInstance};
use crate::reactor::Reactor;
use crate::scheduler::queue_watcher;
use crate::uid::{ContainerId, DepId, WatcherId};
use crate::value::Value;

/// Computes a watcher's value. Reads performed through the reactor are tracked.
pub type Getter = Rc<dyn Fn(&Reactor) -> anyhow::Result<Value>>;

/// Called with `(new_value, old_value)` when a watcher's value changes.
pub type Callback = Rc<dyn Fn(&Reactor, &Value, &Value) -> anyhow::Result<()>>;

/// What a [Watcher] evaluates.
#[derive(Clone)]
pub enum Expr {
    /// A dot-delimited path (`"a.b.c"`) resolved from the owner instance.
    Path(String),
    /// An arbitrary getter, with an optional label used in diagnostics.
    Getter(Option<String>, Getter),
}

/// Watcher flags. All default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Don't evaluate until asked: notifications only mark the watcher dirty.
    pub lazy: bool,
    /// The getter and callback are user code: their errors go to the error hook.
    pub user: bool,
    /// Also track every nested field of the value.
    pub deep: bool,
    /// Re-run synchronously on notification instead of queueing.
    pub sync: bool,
    /// Invoke the callback once right after creation (only honored by [Instance::watch]).
    pub immediate: bool,
}

/// One trackable unit of work: a user watch or a computed value's getter.
///
/// Each evaluation ([Watcher::get]) records the deps it reads. Deps read last round but not
/// this round are unsubscribed, so conditional reads never leave stale subscriptions.
///
/// A watcher is kept alive by its owner's watcher list (or by your handle when it has no
/// owner); deps only hold it weakly. Dropping the last handle unsubscribes it like
/// [Watcher::teardown].
#[derive(Clone)]
pub struct Watcher(Rc<WatcherInner>);

#[derive(Clone)]
pub(crate) struct WeakWatcher(Weak<WatcherInner>);

#[derive(Derivative)]
#[derivative(Debug)]
struct WatcherInner {
    id: WatcherId,
    expression: String,
    #[derivative(Debug = "ignore")]
    owner: Option<WeakInstance>,
    #[derivative(Debug = "ignore")]
    getter: Getter,
    #[derivative(Debug = "ignore")]
    callback: Option<Callback>,
    options: WatchOptions,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    active: Cell<bool>,
    #[derivative(Debug(format_with = "fmt_dep_ids"))]
    deps: RefCell<BTreeMap<DepId, Dep>>,
    #[derivative(Debug = "ignore")]
    new_deps: RefCell<BTreeMap<DepId, Dep>>,
}

impl Expr {
    pub fn path(path: impl Into<String>) -> Expr {
        Expr::Path(path.into())
    }

    pub fn getter(getter: impl Fn(&Reactor) -> anyhow::Result<Value> + 'static) -> Expr {
        Expr::Getter(None, Rc::new(getter))
    }

    pub fn labeled(label: impl Into<String>, getter: impl Fn(&Reactor) -> anyhow::Result<Value> + 'static) -> Expr {
        Expr::Getter(Some(label.into()), Rc::new(getter))
    }
}

impl From<&str> for Expr {
    fn from(path: &str) -> Self {
        Expr::path(path)
    }
}

impl From<String> for Expr {
    fn from(path: String) -> Self {
        Expr::Path(path)
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Expr::Getter(label, _) => f.debug_tuple("Getter").field(label).finish(),
        }
    }
}

impl WatchOptions {
    pub fn lazy() -> Self {
        WatchOptions { lazy: true, ..Default::default() }
    }

    pub fn user() -> Self {
        WatchOptions { user: true, ..Default::default() }
    }

    pub fn with_deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }
}

impl Watcher {
    /// Create a watcher and, unless `lazy`, evaluate it once to capture its initial value and
    /// dependencies. The watcher is added to `owner`'s watcher list.
    ///
    /// Fails only if a non-user getter fails during that first evaluation.
    pub fn new(
        rx: &Reactor,
        owner: Option<&Instance>,
        expr: impl Into<Expr>,
        callback: Option<Callback>,
        options: WatchOptions,
    ) -> Result<Watcher> {
        let (expression, getter) = match expr.into() {
            Expr::Getter(label, getter) => (label.unwrap_or_else(|| "<getter>".to_owned()), getter),
            Expr::Path(path) => {
                let getter = path_getter(rx, owner, &path);
                (path, getter)
            }
        };
        let watcher = Watcher(Rc::new(WatcherInner {
            id: WatcherId::next(),
            expression,
            owner: owner.map(Instance::downgrade),
            getter,
            callback,
            options,
            value: RefCell::new(Value::Undefined),
            dirty: Cell::new(options.lazy),
            active: Cell::new(true),
            deps: RefCell::new(BTreeMap::new()),
            new_deps: RefCell::new(BTreeMap::new()),
        }));
        if let Some(owner) = owner {
            owner.push_watcher(watcher.clone());
        }
        debug!("created watcher {:?} \"{}\" {:?}", watcher.id(), watcher.expression(), options);
        if !options.lazy {
            match watcher.get(rx) {
                Ok(value) => *watcher.0.value.borrow_mut() = value,
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            }
        }
        Ok(watcher)
    }

    pub fn id(&self) -> WatcherId {
        self.0.id
    }

    pub fn expression(&self) -> &str {
        &self.0.expression
    }

    pub fn options(&self) -> WatchOptions {
        self.0.options
    }

    /// The cached value from the last evaluation.
    pub fn value(&self) -> Value {
        self.0.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn owner(&self) -> Option<Instance> {
        self.0.owner.as_ref().and_then(WeakInstance::upgrade)
    }

    /// The deps this watcher is currently subscribed to.
    pub fn deps(&self) -> Vec<Dep> {
        self.0.deps.borrow().values().cloned().collect()
    }

    pub fn dep_count(&self) -> usize {
        self.0.deps.borrow().len()
    }

    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakWatcher {
        WeakWatcher(Rc::downgrade(&self.0))
    }

    /// Evaluate the getter with this watcher as the active target, then replace the
    /// subscribed deps by the ones read during this evaluation.
    ///
    /// A failing *user* getter is reported to the error hook and yields [Value::Undefined].
    pub fn get(&self, rx: &Reactor) -> Result<Value> {
        let result = {
            let _target = rx.push_target(Some(self.clone()));
            let result = match (self.0.getter)(rx) {
                Ok(value) => Ok(value),
                Err(err) if self.0.options.user => {
                    let label = format!("getter for watcher \"{}\"", self.0.expression);
                    rx.handle_error(&err, self.owner().as_ref(), &label);
                    Ok(Value::Undefined)
                }
                Err(source) => Err(Error::Evaluation {
                    expression: self.0.expression.clone(),
                    source,
                }),
            };
            // Touch nested fields while still the active target so they're tracked.
            if self.0.options.deep {
                if let Ok(value) = &result {
                    traverse(rx, value);
                }
            }
            result
        };
        self.cleanup_deps();
        result
    }

    pub(crate) fn add_dep(&self, dep: &Dep) {
        if !self.0.active.get() {
            return;
        }
        let id = dep.id();
        let mut new_deps = self.0.new_deps.borrow_mut();
        if !new_deps.contains_key(&id) {
            new_deps.insert(id, dep.clone());
            if !self.0.deps.borrow().contains_key(&id) {
                dep.add_sub(self);
            }
        }
    }

    fn cleanup_deps(&self) {
        let new_deps = std::mem::take(&mut *self.0.new_deps.borrow_mut());
        let old_deps = self.0.deps.replace(new_deps);
        let deps = self.0.deps.borrow();
        for (id, dep) in old_deps {
            if !deps.contains_key(&id) {
                trace!("watcher {:?} no longer reads dep {:?}", self.0.id, id);
                dep.remove_sub(self.0.id);
            }
        }
    }

    /// React to a dep notification: lazy watchers become dirty, sync watchers re-run now,
    /// others are queued for the next flush. No-op once torn down.
    pub fn update(&self, rx: &Reactor) {
        if !self.0.active.get() {
            return;
        }
        if self.0.options.lazy {
            self.0.dirty.set(true);
        } else if self.0.options.sync {
            if let Err(err) = self.run(rx) {
                rx.handle_error(&anyhow::Error::new(err), self.owner().as_ref(), "sync watcher");
            }
        } else {
            queue_watcher(rx, self.clone());
        }
    }

    /// Re-evaluate and invoke the callback if the value changed. Containers and deep
    /// watchers always count as changed, since they may have been mutated in place.
    pub fn run(&self, rx: &Reactor) -> Result<()> {
        if !self.0.active.get() {
            return Ok(());
        }
        let value = self.get(rx)?;
        let changed = !value.same_value(&self.0.value.borrow()) || value.is_container() || self.0.options.deep;
        if changed {
            let old_value = self.0.value.replace(value.clone());
            self.invoke_callback(rx, &value, &old_value, "callback for watcher")?;
        }
        Ok(())
    }

    pub(crate) fn invoke_callback(&self, rx: &Reactor, value: &Value, old_value: &Value, label: &str) -> Result<()> {
        let Some(callback) = self.0.callback.clone() else {
            return Ok(());
        };
        match callback(rx, value, old_value) {
            Ok(()) => Ok(()),
            Err(err) if self.0.options.user => {
                let label = format!("{} \"{}\"", label, self.0.expression);
                rx.handle_error(&err, self.owner().as_ref(), &label);
                Ok(())
            }
            Err(source) => Err(Error::Callback {
                expression: self.0.expression.clone(),
                source,
            }),
        }
    }

    /// Evaluate now and clear the dirty flag. Used by the computed read path.
    pub fn evaluate(&self, rx: &Reactor) -> Result<()> {
        let value = self.get(rx)?;
        *self.0.value.borrow_mut() = value;
        self.0.dirty.set(false);
        Ok(())
    }

    /// Make the active target depend on every dep this watcher holds. This is how reading a
    /// computed value subscribes the reader to the computed value's own inputs.
    pub fn depend(&self, rx: &Reactor) {
        for dep in self.deps() {
            dep.depend(rx);
        }
    }

    /// Unsubscribe from every dep and leave the owner's watcher list. Idempotent, and safe
    /// to call while a notification is being delivered: a queued run becomes a no-op.
    pub fn teardown(&self) {
        if !self.0.active.replace(false) {
            return;
        }
        if let Some(owner) = self.owner() {
            owner.remove_watcher(self.0.id);
        }
        let deps = std::mem::take(&mut *self.0.deps.borrow_mut());
        let new_deps = std::mem::take(&mut *self.0.new_deps.borrow_mut());
        for dep in deps.values().chain(new_deps.values()) {
            dep.remove_sub(self.0.id);
        }
        debug!("tore down watcher {:?} \"{}\"", self.0.id, self.0.expression);
    }
}

impl PartialEq for Watcher {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Watcher {}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        let id = self.id;
        for dep in self.deps.get_mut().values().chain(self.new_deps.get_mut().values()) {
            dep.remove_sub(id);
        }
    }
}

impl Debug for Watcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl WeakWatcher {
    pub(crate) fn upgrade(&self) -> Option<Watcher> {
        self.0.upgrade().map(Watcher)
    }
}

fn fmt_dep_ids(deps: &RefCell<BTreeMap<DepId, Dep>>, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_list().entries(deps.borrow().keys()).finish()
}

/// Split a dot-delimited path into segments, or `None` if it contains anything other than
/// word characters, `$` and `.`.
pub fn parse_path(path: &str) -> Option<Vec<String>> {
    if path.chars().any(|c| !(c.is_alphanumeric() || c == '_' || c == '$' || c == '.')) {
        return None;
    }
    Some(path.split('.').map(str::to_owned).collect())
}

fn path_getter(rx: &Reactor, owner: Option<&Instance>, path: &str) -> Getter {
    let Some(segments) = parse_path(path) else {
        rx.warn(
            &format!("Invalid watch path \"{}\": only dot-delimited names are supported, use a getter instead", path),
            owner,
        );
        return Rc::new(|_: &Reactor| -> anyhow::Result<Value> { Ok(Value::Undefined) });
    };
    let Some(owner) = owner else {
        rx.warn(&format!("Watching path \"{}\" requires an owner instance", path), None);
        return Rc::new(|_: &Reactor| -> anyhow::Result<Value> { Ok(Value::Undefined) });
    };
    let owner = owner.downgrade();
    Rc::new(move |rx: &Reactor| -> anyhow::Result<Value> {
        let Some(owner) = owner.upgrade() else {
            return Ok(Value::Undefined);
        };
        let mut value = Value::Undefined;
        for (index, segment) in segments.iter().enumerate() {
            value = if index == 0 {
                owner.get(rx, segment)
            } else {
                match &value {
                    Value::Object(object) => object.get(rx, segment),
                    Value::List(list) if segment == "length" => Value::Number(list.len() as f64),
                    Value::List(list) => segment.parse::<usize>().map_or(Value::Undefined, |i| list.get(i)),
                    _ => return Ok(Value::Undefined),
                }
            };
        }
        Ok(value)
    })
}

/// Read every nested field of `value` so the active target depends on all of them.
/// Cycles and frozen containers are skipped.
pub fn traverse(rx: &Reactor, value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(rx, value, &mut seen);
}

fn traverse_inner(rx: &Reactor, value: &Value, seen: &mut HashSet<ContainerId>) {
    match value {
        Value::Object(object) => {
            if object.is_frozen() || !seen.insert(object.id()) {
                return;
            }
            for key in object.keys() {
                traverse_inner(rx, &object.get(rx, &key), seen);
            }
        }
        Value::List(list) => {
            if list.is_frozen() || !seen.insert(list.id()) {
                return;
            }
            for item in list.to_vec() {
                traverse_inner(rx, &item, seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_paths() {
        assert_eq!(parse_path("a"), Some(vec!["a".to_owned()]));
        assert_eq!(parse_path("a.b.$c_1"), Some(vec!["a".to_owned(), "b".to_owned(), "$c_1".to_owned()]));
    }

    #[test]
    fn reject_complex_paths() {
        assert_eq!(parse_path("a[0]"), None);
        assert_eq!(parse_path("a + b"), None);
        assert_eq!(parse_path("a()"), None);
    }
}

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use log::debug;
use crate::computed::Computed;
use crate::error::Result;
use crate::observer::{define_reactive, observe, CustomSetter};
use crate::reactor::Reactor;
use crate::uid::WatcherId;
use crate::value::{Object, Value};
use crate::watcher::{Expr, WatchOptions, Watcher};

/// A node in the owner tree: the thing watchers and computed values belong to.
///
/// An instance exposes one flat namespace of properties. Each name is bound to its backing
/// storage (props, data, a computed value, or the instance's own fields, which is where
/// injected values live) and [Instance::get] / [Instance::set] forward to it. The
/// forwarding itself isn't reactive; the backing storage is.
#[derive(Clone)]
pub struct Instance(Rc<InstanceInner>);

#[derive(Clone)]
pub struct WeakInstance(Weak<InstanceInner>);

struct InstanceInner {
    name: String,
    parent: Option<Instance>,
    props: Object,
    data: RefCell<Option<Object>>,
    own: Object,
    bindings: RefCell<BTreeMap<String, Binding>>,
    provided: RefCell<Option<BTreeMap<String, Value>>>,
    watchers: RefCell<Vec<Watcher>>,
    updating_props: Cell<bool>,
    destroyed: Cell<bool>,
}

#[derive(Clone)]
enum Binding {
    Prop,
    Data,
    Computed(Computed),
    Own,
}

/// Handle returned by [Instance::watch]. Dropping it does *not* stop the watch.
#[derive(Debug, Clone)]
pub struct Unwatch(Watcher);

impl Instance {
    pub fn new(parent: Option<&Instance>, name: impl Into<String>) -> Self {
        Instance(Rc::new(InstanceInner {
            name: name.into(),
            parent: parent.cloned(),
            props: Object::new(),
            data: RefCell::new(None),
            own: Object::new(),
            bindings: RefCell::new(BTreeMap::new()),
            provided: RefCell::new(None),
            watchers: RefCell::new(Vec::new()),
            updating_props: Cell::new(false),
            destroyed: Cell::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&Instance> {
        self.0.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn root(&self) -> Instance {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current.clone()
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.0))
    }

    pub fn props(&self) -> &Object {
        &self.0.props
    }

    pub fn data(&self) -> Option<Object> {
        self.0.data.borrow().clone()
    }

    /// Fields defined directly on the instance (injected bindings).
    pub fn own_fields(&self) -> &Object {
        &self.0.own
    }

    /// Every property name the instance exposes.
    pub fn keys(&self) -> Vec<String> {
        self.0.bindings.borrow().keys().cloned().collect()
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.bindings.borrow().contains_key(key)
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    pub fn watchers(&self) -> Vec<Watcher> {
        self.0.watchers.borrow().clone()
    }

    pub(crate) fn push_watcher(&self, watcher: Watcher) {
        self.0.watchers.borrow_mut().push(watcher);
    }

    pub(crate) fn remove_watcher(&self, id: WatcherId) {
        self.0.watchers.borrow_mut().retain(|watcher| watcher.id() != id);
    }

    pub(crate) fn provided(&self) -> &RefCell<Option<BTreeMap<String, Value>>> {
        &self.0.provided
    }

    pub(crate) fn bind_own(&self, key: &str) {
        self.0.bindings.borrow_mut().insert(key.to_owned(), Binding::Own);
    }

    // region initialization

    /// Define props passed from the parent. Prop values of non-root instances are not
    /// observed: the parent owns them.
    pub fn init_props<K: Into<String>, V: Into<Value>>(&self, rx: &Reactor, entries: impl IntoIterator<Item = (K, V)>) {
        let define = || {
            for (key, value) in entries {
                let key = key.into();
                define_reactive(rx, &self.0.props, &key, value.into(), Some(self.prop_mutation_warning(&key)), false);
                self.0.bindings.borrow_mut().insert(key, Binding::Prop);
            }
        };
        if self.is_root() {
            define();
        } else {
            rx.without_observing(define);
        }
    }

    /// Pass new prop values down. Unlike [Instance::set] this doesn't warn.
    pub fn update_props<K: AsRef<str>, V: Into<Value>>(&self, rx: &Reactor, entries: impl IntoIterator<Item = (K, V)>) {
        self.0.updating_props.set(true);
        rx.without_observing(|| {
            for (key, value) in entries {
                self.0.props.set(rx, key.as_ref(), value.into());
            }
        });
        self.0.updating_props.set(false);
    }

    fn prop_mutation_warning(&self, key: &str) -> CustomSetter {
        let instance = self.downgrade();
        let key = key.to_owned();
        Rc::new(move |rx: &Reactor| {
            let Some(instance) = instance.upgrade() else { return };
            if !instance.0.updating_props.get() {
                rx.warn(
                    &format!("Avoid mutating a prop directly since the value will be overwritten whenever the parent re-renders. Instead, use a data or computed property based on the prop's value. Prop being mutated: \"{}\"", key),
                    Some(&instance),
                );
            }
        })
    }

    /// Install `data` as the instance's root data and expose its fields.
    ///
    /// Fields clashing with a prop, or whose name starts with `_` or `$`, stay in the data
    /// table but aren't exposed on the instance.
    pub fn init_data(&self, rx: &Reactor, data: Object) {
        for key in data.keys() {
            let clashes_with_prop = matches!(self.0.bindings.borrow().get(&key), Some(Binding::Prop));
            if clashes_with_prop {
                rx.warn(&format!("The data property \"{}\" is already declared as a prop. Use prop default value instead.", key), Some(self));
            } else if is_reserved(&key) {
                rx.warn(
                    &format!("Property \"{}\" must be accessed through the data table because properties starting with \"$\" or \"_\" are not proxied.", key),
                    Some(self),
                );
            } else {
                self.0.bindings.borrow_mut().insert(key, Binding::Data);
            }
        }
        observe(rx, &Value::Object(data.clone()), true);
        *self.0.data.borrow_mut() = Some(data);
    }

    /// Define a computed property. The getter receives this instance.
    pub fn init_computed(
        &self,
        rx: &Reactor,
        key: &str,
        getter: impl Fn(&Reactor, &Instance) -> anyhow::Result<Value> + 'static,
    ) -> Result<()> {
        if let Some(computed) = self.computed(rx, key, getter)? {
            self.0.bindings.borrow_mut().insert(key.to_owned(), Binding::Computed(computed));
        }
        Ok(())
    }

    /// Define a computed property which can be assigned to.
    pub fn init_computed_with_setter(
        &self,
        rx: &Reactor,
        key: &str,
        getter: impl Fn(&Reactor, &Instance) -> anyhow::Result<Value> + 'static,
        setter: impl Fn(&Reactor, &Instance, Value) -> anyhow::Result<()> + 'static,
    ) -> Result<()> {
        if let Some(computed) = self.computed(rx, key, getter)? {
            let instance = self.downgrade();
            let computed = computed.with_setter(move |rx, value| match instance.upgrade() {
                Some(instance) => setter(rx, &instance, value),
                None => Ok(()),
            });
            self.0.bindings.borrow_mut().insert(key.to_owned(), Binding::Computed(computed));
        }
        Ok(())
    }

    fn computed(
        &self,
        rx: &Reactor,
        key: &str,
        getter: impl Fn(&Reactor, &Instance) -> anyhow::Result<Value> + 'static,
    ) -> Result<Option<Computed>> {
        let clash = match self.0.bindings.borrow().get(key) {
            Some(Binding::Data) => Some("in data"),
            Some(Binding::Prop) => Some("as a prop"),
            Some(Binding::Computed(_)) => Some("as a computed property"),
            Some(Binding::Own) => Some("on the instance"),
            None => None,
        };
        if let Some(clash) = clash {
            rx.warn(&format!("The computed property \"{}\" is already defined {}.", key, clash), Some(self));
            return Ok(None);
        }
        let instance = self.downgrade();
        let computed = Computed::labeled(rx, Some(self), key, move |rx| match instance.upgrade() {
            Some(instance) => getter(rx, &instance),
            None => Ok(Value::Undefined),
        })?;
        Ok(Some(computed))
    }

    // endregion

    /// Watch an expression: a path into this instance's properties, or a getter.
    ///
    /// The watch is a *user* watch: errors from the getter or the callback go to the error
    /// hook. With `immediate`, the callback runs once right away with [Value::Undefined] as
    /// the old value.
    pub fn watch(
        &self,
        rx: &Reactor,
        expr: impl Into<Expr>,
        callback: impl Fn(&Reactor, &Value, &Value) -> anyhow::Result<()> + 'static,
        options: WatchOptions,
    ) -> Result<Unwatch> {
        let options = WatchOptions { user: true, ..options };
        let watcher = Watcher::new(rx, Some(self), expr, Some(Rc::new(callback)), options)?;
        if options.immediate {
            let value = watcher.value();
            rx.untracked(|| watcher.invoke_callback(rx, &value, &Value::Undefined, "callback for immediate watcher"))?;
        }
        Ok(Unwatch(watcher))
    }

    /// Read a property. Unknown names warn and read as [Value::Undefined].
    pub fn get(&self, rx: &Reactor, key: &str) -> Value {
        let binding = self.0.bindings.borrow().get(key).cloned();
        match binding {
            Some(Binding::Prop) => self.0.props.get(rx, key),
            Some(Binding::Data) => self.data().map_or(Value::Undefined, |data| data.get(rx, key)),
            Some(Binding::Own) => self.0.own.get(rx, key),
            Some(Binding::Computed(computed)) => match computed.get(rx) {
                Ok(value) => value,
                Err(err) => {
                    let label = format!("computed property \"{}\"", key);
                    rx.handle_error(&anyhow::Error::new(err), Some(self), &label);
                    Value::Undefined
                }
            },
            None => {
                rx.warn(&format!("Property \"{}\" was accessed but is not defined on the instance.", key), Some(self));
                Value::Undefined
            }
        }
    }

    /// Write a property. Props and injected values accept the write but warn; computed
    /// properties forward to their setter.
    pub fn set(&self, rx: &Reactor, key: &str, value: Value) {
        let binding = self.0.bindings.borrow().get(key).cloned();
        match binding {
            Some(Binding::Prop) => self.0.props.set(rx, key, value),
            Some(Binding::Data) => {
                if let Some(data) = self.data() {
                    data.set(rx, key, value);
                }
            }
            Some(Binding::Own) => self.0.own.set(rx, key, value),
            Some(Binding::Computed(computed)) => computed.set(rx, value),
            None => rx.warn(
                &format!("Cannot set undeclared property \"{}\" on the instance; declare it in the data table.", key),
                Some(self),
            ),
        }
    }

    /// The computed property bound to `key`, if any.
    pub fn computed_property(&self, key: &str) -> Option<Computed> {
        match self.0.bindings.borrow().get(key) {
            Some(Binding::Computed(computed)) => Some(computed.clone()),
            _ => None,
        }
    }

    /// Tear down every watcher this instance owns. Idempotent.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        let watchers = std::mem::take(&mut *self.0.watchers.borrow_mut());
        for watcher in &watchers {
            watcher.teardown();
        }
        if let Some(ob) = self.data().and_then(|data| data.observer()) {
            ob.release_root();
        }
        debug!("destroyed instance <{}> ({} watcher(s))", self.0.name, watchers.len());
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.0.name)
            .field("parent", &self.0.parent.as_ref().map(Instance::name))
            .field("keys", &self.keys())
            .finish()
    }
}

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(Instance)
    }
}

impl Unwatch {
    /// Stop watching.
    pub fn unwatch(&self) {
        self.0.teardown();
    }

    pub fn watcher(&self) -> &Watcher {
        &self.0
    }
}

fn is_reserved(key: &str) -> bool {
    key.starts_with('_') || key.starts_with('$')
}
